//! RESP command serializer.
//!
//! Commands go over the wire as an array of bulk strings:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

/// Encode one command into RESP wire format.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(args));
    write_command(&mut buf, &mut Buffer::new(), args);
    buf
}

/// Encode a batch of commands into one contiguous buffer so the whole
/// pipeline goes out in a single write.
pub fn encode_pipeline<A: AsRef<[u8]>>(commands: &[Vec<A>]) -> Vec<u8> {
    let cap = commands.iter().map(|c| encoded_len(c)).sum();
    let mut buf = Vec::with_capacity(cap);
    let mut digits = Buffer::new();
    for args in commands {
        write_command(&mut buf, &mut digits, args);
    }
    buf
}

fn write_command<A: AsRef<[u8]>>(buf: &mut Vec<u8>, digits: &mut Buffer, args: &[A]) {
    buf.push(b'*');
    buf.extend_from_slice(digits.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(digits.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Upper bound on the encoded size, to size the buffer once.
fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    13 + args
        .iter()
        .map(|a| 1 + 20 + 2 + a.as_ref().len() + 2)
        .sum::<usize>()
}

// ── Tests ──────────────────────────────────────────────────────────
