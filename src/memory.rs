//! In-process store with Redis reply semantics.
//!
//! Supports every classified verb plus a handful of unclassified ones, and
//! lets tests break it on demand. Clones share data, call log and identity,
//! so two clones count as one physical connection.

use crate::command::{Command, CommandName};
use crate::error::{Result, StoreError};
use crate::resp::types::RespValue;
use crate::store::StoreHandle;

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const NOT_FLOAT: &str = "ERR value is not a valid float";
const SYNTAX: &str = "ERR syntax error";

#[derive(Debug, Clone)]
enum Value {
    Str(Bytes),
    Hash(BTreeMap<Bytes, Bytes>),
    Set(BTreeSet<Bytes>),
    List(Vec<Bytes>),
    Zset(BTreeMap<Bytes, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<Bytes, Entry>,
}

#[derive(Debug, Default)]
struct Faults {
    remaining: usize,
    always: bool,
}

#[derive(Debug)]
struct Shared {
    id: String,
    keyspace: Mutex<Keyspace>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Command>>,
}

/// HashMap-backed [`StoreHandle`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Empty store; `id` becomes its connection id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: id.into(),
                keyspace: Mutex::new(Keyspace::default()),
                faults: Mutex::new(Faults::default()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fail the next `n` calls with a connection error.
    pub fn fail_next(&self, n: usize) {
        self.shared.faults.lock().remaining = n;
    }

    /// Fail every call until [`recover`](Self::recover).
    pub fn fail_always(&self) {
        self.shared.faults.lock().always = true;
    }

    pub fn recover(&self) {
        *self.shared.faults.lock() = Faults::default();
    }

    /// Every command this store was asked to run, including failed attempts.
    pub fn calls(&self) -> Vec<Command> {
        self.shared.calls.lock().clone()
    }

    /// Verbs of [`calls`](Self::calls).
    pub fn call_names(&self) -> Vec<String> {
        self.shared
            .calls
            .lock()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.shared.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    /// String value at `key`, bypassing the call log and fault injection.
    pub fn peek(&self, key: impl AsRef<[u8]>) -> Option<Bytes> {
        let mut ks = self.shared.keyspace.lock();
        match ks.live(key.as_ref()) {
            Some(Entry {
                value: Value::Str(v),
                ..
            }) => Some(v.clone()),
            _ => None,
        }
    }

    /// Whether `key` exists, bypassing the call log and fault injection.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.shared.keyspace.lock().live(key.as_ref()).is_some()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        let mut ks = self.shared.keyspace.lock();
        ks.purge_expired();
        ks.entries.len()
    }

    fn record(&self, commands: &[Command]) {
        self.shared.calls.lock().extend(commands.iter().cloned());
    }

    fn check_faults(&self) -> Result<()> {
        let mut faults = self.shared.faults.lock();
        if faults.always || faults.remaining > 0 {
            faults.remaining = faults.remaining.saturating_sub(1);
            return Err(StoreError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("injected failure on {}", self.shared.id),
            )));
        }
        Ok(())
    }
}

impl StoreHandle for MemoryStore {
    fn connection_id(&self) -> String {
        self.shared.id.clone()
    }

    fn execute(&self, command: &Command) -> Result<RespValue> {
        self.record(std::slice::from_ref(command));
        self.check_faults()?;
        let mut ks = self.shared.keyspace.lock();
        match ks.apply(command) {
            Some(RespValue::Error(msg)) => Err(StoreError::redis(msg)),
            Some(reply) => Ok(reply),
            None => Err(StoreError::Unsupported(command.name().to_string())),
        }
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        self.record(commands);
        self.check_faults()?;
        let mut ks = self.shared.keyspace.lock();
        Ok(commands.iter().map(|c| ks.apply_or_error(c)).collect())
    }

    fn transaction(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        self.record(commands);
        self.check_faults()?;
        // One lock for the whole batch keeps it atomic.
        let mut ks = self.shared.keyspace.lock();
        Ok(commands.iter().map(|c| ks.apply_or_error(c)).collect())
    }
}

// ── Command semantics ──────────────────────────────────────────────

/// `None` when `ttl` runs past what [`Instant`] can represent.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

fn err(msg: &str) -> RespValue {
    RespValue::Error(msg.to_string())
}

fn arity(name: &str) -> RespValue {
    RespValue::Error(format!("ERR wrong number of arguments for '{name}' command"))
}

fn int_arg(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn float_arg(arg: &[u8]) -> Option<f64> {
    let v: f64 = std::str::from_utf8(arg).ok()?.parse().ok()?;
    (!v.is_nan()).then_some(v)
}

fn format_score(score: f64) -> RespValue {
    RespValue::bulk(score.to_string())
}

fn is_hash(v: &Value) -> bool {
    matches!(v, Value::Hash(_))
}

fn is_set(v: &Value) -> bool {
    matches!(v, Value::Set(_))
}

fn is_list(v: &Value) -> bool {
    matches!(v, Value::List(_))
}

fn is_zset(v: &Value) -> bool {
    matches!(v, Value::Zset(_))
}

fn count(n: usize) -> RespValue {
    RespValue::Integer(n as i64)
}

impl Keyspace {
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
    }

    fn insert(&mut self, key: &Bytes, value: Value) {
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }

    /// Drop collection keys that became empty, as Redis does.
    fn drop_if_empty(&mut self, key: &[u8]) {
        let empty = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Hash(h)) => h.is_empty(),
            Some(Value::Set(s)) => s.is_empty(),
            Some(Value::List(l)) => l.is_empty(),
            Some(Value::Zset(z)) => z.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn apply_or_error(&mut self, command: &Command) -> RespValue {
        self.apply(command).unwrap_or_else(|| {
            RespValue::Error(format!("ERR unknown command '{}'", command.name()))
        })
    }

    /// Reply for `command`, or `None` if this store does not know the verb.
    fn apply(&mut self, command: &Command) -> Option<RespValue> {
        match command {
            Command::Known { name, args } => Some(self.apply_known(*name, args)),
            Command::Unclassified { name, args } => match name.as_str() {
                "ping" => Some(match args.first() {
                    Some(msg) => RespValue::BulkString(msg.clone()),
                    None => RespValue::SimpleString("PONG".into()),
                }),
                "echo" if args.len() == 1 => Some(RespValue::BulkString(args[0].clone())),
                "publish" if args.len() == 2 => Some(RespValue::Integer(0)),
                "dbsize" => {
                    self.purge_expired();
                    Some(count(self.entries.len()))
                }
                _ => None,
            },
        }
    }

    fn apply_known(&mut self, name: CommandName, args: &[Bytes]) -> RespValue {
        use CommandName::*;
        match name {
            Get => match args {
                [key] => match self.live(key) {
                    None => RespValue::Null,
                    Some(Entry {
                        value: Value::Str(v),
                        ..
                    }) => RespValue::BulkString(v.clone()),
                    Some(_) => err(WRONGTYPE),
                },
                _ => arity("get"),
            },
            Mget if !args.is_empty() => RespValue::Array(
                args.iter()
                    .map(|key| match self.live(key) {
                        Some(Entry {
                            value: Value::Str(v),
                            ..
                        }) => RespValue::BulkString(v.clone()),
                        _ => RespValue::Null,
                    })
                    .collect(),
            ),
            Exists if !args.is_empty() => {
                count(args.iter().filter(|k| self.live(k).is_some()).count())
            }
            Strlen => match args {
                [key] => match self.live(key) {
                    None => RespValue::Integer(0),
                    Some(Entry {
                        value: Value::Str(v),
                        ..
                    }) => count(v.len()),
                    Some(_) => err(WRONGTYPE),
                },
                _ => arity("strlen"),
            },
            Ttl => match args {
                [key] => match self.live(key) {
                    None => RespValue::Integer(-2),
                    Some(Entry {
                        expires_at: None, ..
                    }) => RespValue::Integer(-1),
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let left = at.saturating_duration_since(Instant::now());
                        RespValue::Integer(((left.as_millis() + 500) / 1000) as i64)
                    }
                },
                _ => arity("ttl"),
            },

            Set => self.set(args),
            Setnx => match args {
                [key, value] => {
                    if self.live(key).is_some() {
                        RespValue::Integer(0)
                    } else {
                        self.insert(key, Value::Str(value.clone()));
                        RespValue::Integer(1)
                    }
                }
                _ => arity("setnx"),
            },
            Setex => match args {
                [key, secs, value] => match int_arg(secs).filter(|s| *s > 0) {
                    Some(secs) => {
                        let Some(at) = deadline(Duration::from_secs(secs as u64)) else {
                            return err("ERR invalid expire time in 'setex' command");
                        };
                        self.insert(key, Value::Str(value.clone()));
                        self.expire_at(key, at);
                        RespValue::ok()
                    }
                    None => err("ERR invalid expire time in 'setex' command"),
                },
                _ => arity("setex"),
            },
            Del | Unlink if !args.is_empty() => {
                count(args.iter().filter(|k| self.remove(k)).count())
            }
            Expire => match args {
                [key, secs] => {
                    let Some(secs) = int_arg(secs) else {
                        return err(NOT_INTEGER);
                    };
                    if self.live(key).is_none() {
                        return RespValue::Integer(0);
                    }
                    if secs <= 0 {
                        self.entries.remove(&key[..]);
                    } else {
                        let Some(at) = deadline(Duration::from_secs(secs as u64)) else {
                            return err("ERR invalid expire time in 'expire' command");
                        };
                        self.expire_at(key, at);
                    }
                    RespValue::Integer(1)
                }
                _ => arity("expire"),
            },
            Incr => match args {
                [key] => self.incr_by(key, 1),
                _ => arity("incr"),
            },
            Incrby => match args {
                [key, by] => match int_arg(by) {
                    Some(by) => self.incr_by(key, by),
                    None => err(NOT_INTEGER),
                },
                _ => arity("incrby"),
            },

            Hget => match args {
                [key, field] => match self.hash(key) {
                    Ok(Some(h)) => h
                        .get(field)
                        .map_or(RespValue::Null, |v| RespValue::BulkString(v.clone())),
                    Ok(None) => RespValue::Null,
                    Err(e) => e,
                },
                _ => arity("hget"),
            },
            Hgetall => match args {
                [key] => match self.hash(key) {
                    Ok(Some(h)) => RespValue::Array(
                        h.iter()
                            .flat_map(|(f, v)| {
                                [RespValue::BulkString(f.clone()), RespValue::BulkString(v.clone())]
                            })
                            .collect(),
                    ),
                    Ok(None) => RespValue::Array(vec![]),
                    Err(e) => e,
                },
                _ => arity("hgetall"),
            },
            Hmget => match args {
                [key, fields @ ..] if !fields.is_empty() => match self.hash(key) {
                    Ok(h) => RespValue::Array(
                        fields
                            .iter()
                            .map(|f| {
                                h.and_then(|h| h.get(f))
                                    .map_or(RespValue::Null, |v| RespValue::BulkString(v.clone()))
                            })
                            .collect(),
                    ),
                    Err(e) => e,
                },
                _ => arity("hmget"),
            },
            Hlen => match args {
                [key] => match self.hash(key) {
                    Ok(h) => count(h.map_or(0, |h| h.len())),
                    Err(e) => e,
                },
                _ => arity("hlen"),
            },
            Hexists => match args {
                [key, field] => match self.hash(key) {
                    Ok(h) => count(h.is_some_and(|h| h.contains_key(field)) as usize),
                    Err(e) => e,
                },
                _ => arity("hexists"),
            },
            Hset => match args {
                [key, pairs @ ..] if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                    match self.hash_mut(key) {
                        Ok(h) => count(
                            pairs
                                .chunks(2)
                                .filter(|p| h.insert(p[0].clone(), p[1].clone()).is_none())
                                .count(),
                        ),
                        Err(e) => e,
                    }
                }
                _ => arity("hset"),
            },
            Hdel => match args {
                [key, fields @ ..] if !fields.is_empty() => match self.probe(key, is_hash) {
                    Ok(false) => RespValue::Integer(0),
                    Err(e) => e,
                    Ok(true) => {
                        let removed = match self.hash_mut(key) {
                            Ok(h) => fields.iter().filter(|f| h.remove(*f).is_some()).count(),
                            Err(e) => return e,
                        };
                        self.drop_if_empty(key);
                        count(removed)
                    }
                },
                _ => arity("hdel"),
            },
            Hincrby => match args {
                [key, field, by] => {
                    let Some(by) = int_arg(by) else {
                        return err(NOT_INTEGER);
                    };
                    match self.hash_mut(key) {
                        Ok(h) => {
                            let current = match h.get(field) {
                                Some(v) => match int_arg(v) {
                                    Some(n) => n,
                                    None => return err("ERR hash value is not an integer"),
                                },
                                None => 0,
                            };
                            match current.checked_add(by) {
                                Some(next) => {
                                    h.insert(field.clone(), Bytes::from(next.to_string()));
                                    RespValue::Integer(next)
                                }
                                None => err("ERR increment or decrement would overflow"),
                            }
                        }
                        Err(e) => e,
                    }
                }
                _ => arity("hincrby"),
            },

            Smembers => match args {
                [key] => match self.set_ref(key) {
                    Ok(s) => RespValue::Array(
                        s.into_iter()
                            .flatten()
                            .map(|m| RespValue::BulkString(m.clone()))
                            .collect(),
                    ),
                    Err(e) => e,
                },
                _ => arity("smembers"),
            },
            Scard => match args {
                [key] => match self.set_ref(key) {
                    Ok(s) => count(s.map_or(0, |s| s.len())),
                    Err(e) => e,
                },
                _ => arity("scard"),
            },
            Sismember => match args {
                [key, member] => match self.set_ref(key) {
                    Ok(s) => count(s.is_some_and(|s| s.contains(member)) as usize),
                    Err(e) => e,
                },
                _ => arity("sismember"),
            },
            Sadd => match args {
                [key, members @ ..] if !members.is_empty() => match self.set_mut(key) {
                    Ok(s) => count(members.iter().filter(|m| s.insert((*m).clone())).count()),
                    Err(e) => e,
                },
                _ => arity("sadd"),
            },
            Srem => match args {
                [key, members @ ..] if !members.is_empty() => match self.probe(key, is_set) {
                    Ok(false) => RespValue::Integer(0),
                    Err(e) => e,
                    Ok(true) => {
                        let removed = match self.set_mut(key) {
                            Ok(s) => members.iter().filter(|m| s.remove(*m)).count(),
                            Err(e) => return e,
                        };
                        self.drop_if_empty(key);
                        count(removed)
                    }
                },
                _ => arity("srem"),
            },

            Rpush => match args {
                [key, values @ ..] if !values.is_empty() => {
                    match self.probe(key, is_list) {
                        Ok(false) => self.insert(key, Value::List(Vec::new())),
                        Ok(true) => {}
                        Err(e) => return e,
                    }
                    match self.entries.get_mut(&key[..]).map(|e| &mut e.value) {
                        Some(Value::List(l)) => {
                            l.extend(values.iter().cloned());
                            count(l.len())
                        }
                        _ => err(WRONGTYPE),
                    }
                }
                _ => arity("rpush"),
            },

            Zcard => match args {
                [key] => match self.zset_ref(key) {
                    Ok(z) => count(z.map_or(0, |z| z.len())),
                    Err(e) => e,
                },
                _ => arity("zcard"),
            },
            Zscore => match args {
                [key, member] => match self.zset_ref(key) {
                    Ok(z) => z
                        .and_then(|z| z.get(member))
                        .map_or(RespValue::Null, |s| format_score(*s)),
                    Err(e) => e,
                },
                _ => arity("zscore"),
            },
            Zrange => match args {
                [key, start, stop] => {
                    let (Some(start), Some(stop)) = (int_arg(start), int_arg(stop)) else {
                        return err(NOT_INTEGER);
                    };
                    match self.zset_ref(key) {
                        Ok(z) => {
                            let mut members: Vec<(&Bytes, f64)> =
                                z.into_iter().flatten().map(|(m, s)| (m, *s)).collect();
                            members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                            RespValue::Array(
                                rank_range(members.len(), start, stop)
                                    .map(|i| RespValue::BulkString(members[i].0.clone()))
                                    .collect(),
                            )
                        }
                        Err(e) => e,
                    }
                }
                _ => arity("zrange"),
            },
            Zadd => match args {
                [key, pairs @ ..] if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                    let mut parsed = Vec::with_capacity(pairs.len() / 2);
                    for p in pairs.chunks(2) {
                        let Some(score) = float_arg(&p[0]) else {
                            return err(NOT_FLOAT);
                        };
                        parsed.push((p[1].clone(), score));
                    }
                    match self.zset_mut(key) {
                        Ok(z) => count(
                            parsed
                                .into_iter()
                                .filter(|(m, s)| z.insert(m.clone(), *s).is_none())
                                .count(),
                        ),
                        Err(e) => e,
                    }
                }
                _ => arity("zadd"),
            },
            Zrem => match args {
                [key, members @ ..] if !members.is_empty() => match self.probe(key, is_zset) {
                    Ok(false) => RespValue::Integer(0),
                    Err(e) => e,
                    Ok(true) => {
                        let removed = match self.zset_mut(key) {
                            Ok(z) => members.iter().filter(|m| z.remove(*m).is_some()).count(),
                            Err(e) => return e,
                        };
                        self.drop_if_empty(key);
                        count(removed)
                    }
                },
                _ => arity("zrem"),
            },

            Eval => err("ERR scripting is not supported by the in-memory store"),
            Flushdb => {
                self.entries.clear();
                RespValue::ok()
            }

            Mget | Exists | Del | Unlink => arity(name.as_str()),
        }
    }

    /// `SET key value [NX|XX] [EX s|PX ms]`
    fn set(&mut self, args: &[Bytes]) -> RespValue {
        let [key, value, opts @ ..] = args else {
            return arity("set");
        };
        let mut nx = false;
        let mut xx = false;
        let mut expires_at = None;
        let mut i = 0;
        while i < opts.len() {
            let opt = opts[i].to_ascii_uppercase();
            match opt.as_slice() {
                b"NX" => nx = true,
                b"XX" => xx = true,
                b"EX" | b"PX" => {
                    let Some(n) = opts.get(i + 1).and_then(|v| int_arg(v)).filter(|n| *n > 0)
                    else {
                        return err("ERR invalid expire time in 'set' command");
                    };
                    let ttl_for = if opt.as_slice() == b"EX" {
                        Duration::from_secs(n as u64)
                    } else {
                        Duration::from_millis(n as u64)
                    };
                    let Some(at) = deadline(ttl_for) else {
                        return err("ERR invalid expire time in 'set' command");
                    };
                    expires_at = Some(at);
                    i += 1;
                }
                _ => return err(SYNTAX),
            }
            i += 1;
        }
        if nx && xx {
            return err(SYNTAX);
        }
        let exists = self.live(key).is_some();
        if (nx && exists) || (xx && !exists) {
            return RespValue::Null;
        }
        self.insert(key, Value::Str(value.clone()));
        if let Some(at) = expires_at {
            self.expire_at(key, at);
        }
        RespValue::ok()
    }

    /// Whether `key` exists with the kind `is_kind` accepts; WRONGTYPE if it
    /// exists with another kind.
    fn probe(&mut self, key: &[u8], is_kind: fn(&Value) -> bool) -> std::result::Result<bool, RespValue> {
        match self.live(key) {
            None => Ok(false),
            Some(e) if is_kind(&e.value) => Ok(true),
            Some(_) => Err(err(WRONGTYPE)),
        }
    }

    fn expire_at(&mut self, key: &[u8], at: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(at);
        }
    }

    fn incr_by(&mut self, key: &Bytes, by: i64) -> RespValue {
        let current = match self.live(key) {
            None => 0,
            Some(Entry {
                value: Value::Str(v),
                ..
            }) => match int_arg(v) {
                Some(n) => n,
                None => return err(NOT_INTEGER),
            },
            Some(_) => return err(WRONGTYPE),
        };
        let Some(next) = current.checked_add(by) else {
            return err("ERR increment or decrement would overflow");
        };
        let expires_at = self.live(key).and_then(|e| e.expires_at);
        self.entries.insert(
            key.clone(),
            Entry {
                value: Value::Str(Bytes::from(next.to_string())),
                expires_at,
            },
        );
        RespValue::Integer(next)
    }

    fn hash(&mut self, key: &[u8]) -> std::result::Result<Option<&BTreeMap<Bytes, Bytes>>, RespValue> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(Some(h)),
            Some(_) => Err(err(WRONGTYPE)),
        }
    }

    fn hash_mut(&mut self, key: &Bytes) -> std::result::Result<&mut BTreeMap<Bytes, Bytes>, RespValue> {
        if self.live(key).is_none() {
            self.insert(key, Value::Hash(BTreeMap::new()));
        }
        match self.entries.get_mut(&key[..]).map(|e| &mut e.value) {
            Some(Value::Hash(h)) => Ok(h),
            _ => Err(err(WRONGTYPE)),
        }
    }

    fn set_ref(&mut self, key: &[u8]) -> std::result::Result<Option<&BTreeSet<Bytes>>, RespValue> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(err(WRONGTYPE)),
        }
    }

    fn set_mut(&mut self, key: &Bytes) -> std::result::Result<&mut BTreeSet<Bytes>, RespValue> {
        if self.live(key).is_none() {
            self.insert(key, Value::Set(BTreeSet::new()));
        }
        match self.entries.get_mut(&key[..]).map(|e| &mut e.value) {
            Some(Value::Set(s)) => Ok(s),
            _ => Err(err(WRONGTYPE)),
        }
    }

    fn zset_ref(&mut self, key: &[u8]) -> std::result::Result<Option<&BTreeMap<Bytes, f64>>, RespValue> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Zset(z),
                ..
            }) => Ok(Some(z)),
            Some(_) => Err(err(WRONGTYPE)),
        }
    }

    fn zset_mut(&mut self, key: &Bytes) -> std::result::Result<&mut BTreeMap<Bytes, f64>, RespValue> {
        if self.live(key).is_none() {
            self.insert(key, Value::Zset(BTreeMap::new()));
        }
        match self.entries.get_mut(&key[..]).map(|e| &mut e.value) {
            Some(Value::Zset(z)) => Ok(z),
            _ => Err(err(WRONGTYPE)),
        }
    }
}

/// Indices selected by a Redis rank range over `len` items.
fn rank_range(len: usize, start: i64, stop: i64) -> std::ops::Range<usize> {
    let len = len as i64;
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let start = norm(start);
    let stop = norm(stop).min(len - 1);
    if len == 0 || start > stop {
        return 0..0;
    }
    start as usize..stop as usize + 1
}

// ── Tests ──────────────────────────────────────────────────────────
