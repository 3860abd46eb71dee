//! Typed Commands
//!
//! A request array is validated into a [`Command`] before anything touches the
//! store. Validation covers arity, argument types, the numeric-key rule, and
//! SET options; relative expiries are resolved to absolute deadlines here, so
//! executing a command and journaling it see the same deadline.

use crate::protocol::RespValue;
use crate::storage::{Entry, StorageEngine, StoreError};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors produced while validating or executing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a command: {0}")]
    NotACommand(&'static str),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    Arity(&'static str),

    #[error("wrong type for {0}: expected a bulk string")]
    Type(&'static str),

    #[error("invalid key '{0}': key cannot be a number")]
    InvalidKey(String),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Set {
        key: String,
        /// Integer if the submitted value parses as one, bulk string otherwise
        value: RespValue,
        expires_at: Option<SystemTime>,
    },
    Get(String),
    Del(String),
    Incr(String),
}

impl Command {
    /// Validates a request array `[name, args...]`.
    ///
    /// `now` anchors relative expiry options (`EX`, `PX`).
    pub fn from_parts(parts: Vec<RespValue>, now: SystemTime) -> Result<Self, CommandError> {
        let mut parts = parts.into_iter();

        let name = match parts.next() {
            Some(RespValue::BulkString(name)) => String::from_utf8_lossy(&name).to_uppercase(),
            Some(_) => return Err(CommandError::NotACommand("command name must be a bulk string")),
            None => return Err(CommandError::NotACommand("empty command")),
        };
        let args: Vec<RespValue> = parts.collect();

        match name.as_str() {
            "PING" => {
                expect_arity(&args, 0, "ping")?;
                Ok(Command::Ping)
            }
            "ECHO" => {
                let [message] = exactly_one(args, "echo")?;
                Ok(Command::Echo(bulk(message, "message")?))
            }
            "SET" => parse_set(args, now),
            "GET" => Ok(Command::Get(single_key(args, "get")?)),
            "DEL" => Ok(Command::Del(single_key(args, "del")?)),
            "INCR" => Ok(Command::Incr(single_key(args, "incr")?)),
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    /// Lower-case command name, as used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Echo(_) => "echo",
            Command::Set { .. } => "set",
            Command::Get(_) => "get",
            Command::Del(_) => "del",
            Command::Incr(_) => "incr",
        }
    }

    /// True for commands that change the store.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set { .. } | Command::Del(_) | Command::Incr(_))
    }

    /// Runs the command against the store and builds the reply.
    pub fn execute(&self, storage: &StorageEngine) -> Result<RespValue, CommandError> {
        match self {
            Command::Ping => Ok(RespValue::pong()),
            Command::Echo(message) => Ok(RespValue::bulk_string(message.clone())),
            Command::Set {
                key,
                value,
                expires_at,
            } => {
                match expires_at {
                    // A deadline already behind us leaves the key absent
                    Some(at) if *at <= SystemTime::now() => {
                        let _ = storage.delete(key);
                    }
                    Some(at) => storage.set(key.clone(), Entry::with_expiry(value.clone(), *at)),
                    None => storage.set(key.clone(), Entry::new(value.clone())),
                }
                Ok(RespValue::ok())
            }
            Command::Get(key) => match storage.get(key)? {
                RespValue::Integer(n) => Ok(RespValue::bulk_string(n.to_string())),
                value => Ok(value),
            },
            Command::Del(key) => {
                storage.delete(key)?;
                Ok(RespValue::ok())
            }
            Command::Incr(key) => Ok(RespValue::integer(storage.incr(key)?)),
        }
    }

    /// The AOF record for this command, or `None` for read-only commands.
    ///
    /// Expiry is always written as an absolute `PXAT` deadline.
    pub fn to_record(&self) -> Option<RespValue> {
        let parts = match self {
            Command::Ping | Command::Echo(_) | Command::Get(_) => return None,
            Command::Set {
                key,
                value,
                expires_at,
            } => {
                let value = match value {
                    RespValue::Integer(n) => Bytes::from(n.to_string()),
                    RespValue::BulkString(data) => data.clone(),
                    _ => return None,
                };
                let mut parts = vec![text("SET"), text(key), RespValue::BulkString(value)];
                if let Some(at) = expires_at {
                    // Deadlines are range-checked in `parse_set`
                    let millis = unix_millis(*at).unwrap_or(i64::MAX);
                    parts.push(text("PXAT"));
                    parts.push(text(&millis.to_string()));
                }
                parts
            }
            Command::Del(key) => vec![text("DEL"), text(key)],
            Command::Incr(key) => vec![text("INCR"), text(key)],
        };
        Some(RespValue::Array(parts))
    }
}

/// SET key value [EX seconds | PX milliseconds | PXAT unix-milliseconds ...]
fn parse_set(args: Vec<RespValue>, now: SystemTime) -> Result<Command, CommandError> {
    if args.len() < 2 {
        return Err(CommandError::Arity("set"));
    }

    let mut args = args.into_iter();
    let key = key_arg(args.next(), "set")?;
    if key.parse::<i64>().is_ok() {
        return Err(CommandError::InvalidKey(key));
    }

    let raw = bulk(args.next().ok_or(CommandError::Arity("set"))?, "value")?;
    let value = match std::str::from_utf8(&raw).ok().and_then(|s| s.parse::<i64>().ok()) {
        Some(n) => RespValue::Integer(n),
        None => RespValue::BulkString(raw),
    };

    let mut expires_at = None;
    while let Some(option) = args.next() {
        let option = bulk_text(option, "option")?.to_uppercase();
        if !matches!(option.as_str(), "EX" | "PX" | "PXAT") {
            return Err(CommandError::UnknownOption(option));
        }

        let amount = bulk_text(args.next().ok_or(CommandError::Arity("set"))?, "option value")?;
        let amount: i64 = amount
            .parse()
            .map_err(|_| CommandError::Parse(format!("invalid expire time '{}'", amount)))?;
        if amount <= 0 {
            return Err(CommandError::Parse(format!(
                "invalid expire time '{}' in 'set' command",
                amount
            )));
        }

        let deadline = match option.as_str() {
            "EX" => now.checked_add(Duration::from_secs(amount as u64)),
            "PX" => now.checked_add(Duration::from_millis(amount as u64)),
            _ => UNIX_EPOCH.checked_add(Duration::from_millis(amount as u64)),
        };
        // The journal stores the deadline as i64 milliseconds, so anything
        // beyond that could not be replayed
        let deadline = deadline.filter(|at| unix_millis(*at).is_some());
        expires_at = Some(deadline.ok_or_else(|| {
            CommandError::Parse(format!("expire time '{}' is out of range", amount))
        })?);
    }

    Ok(Command::Set {
        key,
        value,
        expires_at,
    })
}

/// Milliseconds since the Unix epoch, if they fit in an `i64`.
fn unix_millis(at: SystemTime) -> Option<i64> {
    let millis = at.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}

fn expect_arity(args: &[RespValue], expected: usize, command: &'static str) -> Result<(), CommandError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CommandError::Arity(command))
    }
}

fn exactly_one(args: Vec<RespValue>, command: &'static str) -> Result<[RespValue; 1], CommandError> {
    <[RespValue; 1]>::try_from(args).map_err(|_| CommandError::Arity(command))
}

fn single_key(args: Vec<RespValue>, command: &'static str) -> Result<String, CommandError> {
    let [key] = exactly_one(args, command)?;
    key_arg(Some(key), command)
}

fn key_arg(value: Option<RespValue>, command: &'static str) -> Result<String, CommandError> {
    bulk_text(value.ok_or(CommandError::Arity(command))?, "key")
}

fn bulk(value: RespValue, what: &'static str) -> Result<Bytes, CommandError> {
    match value {
        RespValue::BulkString(data) => Ok(data),
        _ => Err(CommandError::Type(what)),
    }
}

fn bulk_text(value: RespValue, what: &'static str) -> Result<String, CommandError> {
    let data = bulk(value, what)?;
    String::from_utf8(data.to_vec()).map_err(|_| CommandError::Type(what))
}

fn text(s: &str) -> RespValue {
    RespValue::bulk_string(Bytes::copy_from_slice(s.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(args: &[&str]) -> Vec<RespValue> {
        args.iter().map(|s| text(s)).collect()
    }

    fn parse(args: &[&str]) -> Result<Command, CommandError> {
        Command::from_parts(parts(args), SystemTime::now())
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(parse(&["ping"]), Ok(Command::Ping));
        assert_eq!(parse(&["PiNg"]), Ok(Command::Ping));
        assert_eq!(parse(&["get", "k"]), Ok(Command::Get("k".to_string())));
    }

    #[test]
    fn test_shape_errors() {
        assert_eq!(
            Command::from_parts(vec![], SystemTime::now()),
            Err(CommandError::NotACommand("empty command"))
        );
        assert!(matches!(
            Command::from_parts(vec![RespValue::integer(1)], SystemTime::now()),
            Err(CommandError::NotACommand(_))
        ));
        assert_eq!(
            parse(&["FLY"]),
            Err(CommandError::UnknownCommand("FLY".to_string()))
        );
    }

    #[test]
    fn test_arity() {
        assert_eq!(parse(&["PING", "extra"]), Err(CommandError::Arity("ping")));
        assert_eq!(parse(&["ECHO"]), Err(CommandError::Arity("echo")));
        for cmd in ["GET", "DEL", "INCR"] {
            assert!(matches!(parse(&[cmd]), Err(CommandError::Arity(_))));
            assert!(matches!(parse(&[cmd, "a", "b"]), Err(CommandError::Arity(_))));
        }
        assert_eq!(parse(&["SET"]), Err(CommandError::Arity("set")));
        assert_eq!(parse(&["SET", "k"]), Err(CommandError::Arity("set")));
        assert_eq!(parse(&["SET", "k", "v", "EX"]), Err(CommandError::Arity("set")));
    }

    #[test]
    fn test_argument_types() {
        let echo = vec![text("ECHO"), RespValue::integer(5)];
        assert_eq!(
            Command::from_parts(echo, SystemTime::now()),
            Err(CommandError::Type("message"))
        );

        let get = vec![text("GET"), RespValue::simple_string("k")];
        assert_eq!(
            Command::from_parts(get, SystemTime::now()),
            Err(CommandError::Type("key"))
        );
    }

    #[test]
    fn test_set_value_coercion() {
        assert_eq!(
            parse(&["SET", "counter", "11"]),
            Ok(Command::Set {
                key: "counter".to_string(),
                value: RespValue::integer(11),
                expires_at: None,
            })
        );
        assert_eq!(
            parse(&["SET", "name", "11a"]),
            Ok(Command::Set {
                key: "name".to_string(),
                value: text("11a"),
                expires_at: None,
            })
        );
    }

    #[test]
    fn test_set_rejects_numeric_keys() {
        assert_eq!(
            parse(&["SET", "123", "v"]),
            Err(CommandError::InvalidKey("123".to_string()))
        );
        assert!(matches!(parse(&["SET", "-7", "v"]), Err(CommandError::InvalidKey(_))));
        assert!(parse(&["SET", "abc123", "v"]).is_ok());
    }

    #[test]
    fn test_set_expiry_options() {
        let now = SystemTime::now();

        let cmd = Command::from_parts(parts(&["SET", "k", "v", "ex", "10"]), now).unwrap();
        assert!(matches!(cmd, Command::Set { expires_at: Some(at), .. } if at == now + Duration::from_secs(10)));

        let cmd = Command::from_parts(parts(&["SET", "k", "v", "PX", "1500"]), now).unwrap();
        assert!(matches!(cmd, Command::Set { expires_at: Some(at), .. } if at == now + Duration::from_millis(1500)));

        let cmd = Command::from_parts(parts(&["SET", "k", "v", "PXAT", "1700000000000"]), now).unwrap();
        assert!(matches!(
            cmd,
            Command::Set { expires_at: Some(at), .. }
                if at == UNIX_EPOCH + Duration::from_millis(1_700_000_000_000)
        ));
    }

    #[test]
    fn test_set_option_errors() {
        assert_eq!(
            parse(&["SET", "k", "v", "NX"]),
            Err(CommandError::UnknownOption("NX".to_string()))
        );
        assert!(matches!(
            parse(&["SET", "k", "v", "EX", "soon"]),
            Err(CommandError::Parse(_))
        ));
        assert!(matches!(
            parse(&["SET", "k", "v", "EX", "0"]),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn test_set_rejects_deadlines_the_journal_cannot_hold() {
        assert!(matches!(
            parse(&["SET", "k", "v", "EX", "9000000000000000000"]),
            Err(CommandError::Parse(_))
        ));
        let max = i64::MAX.to_string();
        assert!(matches!(
            parse(&["SET", "k", "v", "PX", max.as_str()]),
            Err(CommandError::Parse(_))
        ));

        // The largest representable deadline survives the trip through a record
        let cmd = parse(&["SET", "k", "v", "PXAT", max.as_str()]).unwrap();
        let record = cmd.to_record().unwrap();
        assert_eq!(
            record,
            RespValue::Array(parts(&["SET", "k", "v", "PXAT", max.as_str()]))
        );

        let RespValue::Array(record) = record else {
            unreachable!()
        };
        assert_eq!(Command::from_parts(record, SystemTime::now()), Ok(cmd));
    }

    #[test]
    fn test_records() {
        assert_eq!(parse(&["GET", "k"]).unwrap().to_record(), None);
        assert_eq!(parse(&["PING"]).unwrap().to_record(), None);
        assert_eq!(
            parse(&["DEL", "k"]).unwrap().to_record(),
            Some(RespValue::Array(parts(&["DEL", "k"])))
        );
        assert_eq!(
            parse(&["SET", "n", "5"]).unwrap().to_record(),
            Some(RespValue::Array(parts(&["SET", "n", "5"])))
        );

        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let cmd = Command::from_parts(parts(&["SET", "k", "v", "EX", "5"]), now).unwrap();
        assert_eq!(
            cmd.to_record(),
            Some(RespValue::Array(parts(&["SET", "k", "v", "PXAT", "1005000"])))
        );
    }

    #[test]
    fn test_execute_set_in_the_past_removes_key() {
        let storage = StorageEngine::new();
        storage.set("k".to_string(), Entry::new(text("old")));

        let cmd = parse(&["SET", "k", "v", "PXAT", "1000"]).unwrap();
        assert_eq!(cmd.execute(&storage), Ok(RespValue::ok()));
        assert_eq!(storage.get("k"), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_execute_get_surfaces_integers_as_text() {
        let storage = StorageEngine::new();
        parse(&["SET", "counter", "11"]).unwrap().execute(&storage).unwrap();

        assert_eq!(
            parse(&["GET", "counter"]).unwrap().execute(&storage),
            Ok(text("11"))
        );
    }
}
