//! Binary encoding for values persisted through the flat store.
//!
//! One tag byte followed by a big-endian payload. Strings and keywords
//! carry a u32 length prefix; instants are encoded as millisecond
//! timestamps.

use chrono::{DateTime, Utc};

use crate::{Keyword, NodeId, Result, UmbraError, Value};

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_KW: u8 = 5;
const TAG_INST: u8 = 6;
const TAG_NODE: u8 = 7;

pub fn encode_value(value: &Value, dst: &mut Vec<u8>) {
    match value {
        Value::Nil => dst.push(TAG_NIL),
        Value::Bool(v) => {
            dst.push(TAG_BOOL);
            dst.push(u8::from(*v));
        }
        Value::Int(v) => {
            dst.push(TAG_INT);
            dst.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float(v) => {
            dst.push(TAG_FLOAT);
            dst.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Value::Str(v) => {
            dst.push(TAG_STR);
            push_str(dst, v);
        }
        Value::Kw(kw) => {
            dst.push(TAG_KW);
            push_str(dst, kw.ns.as_deref().unwrap_or(""));
            push_str(dst, &kw.name);
        }
        Value::Inst(v) => {
            dst.push(TAG_INST);
            dst.extend_from_slice(&v.timestamp_millis().to_be_bytes());
        }
        Value::Node(n) => {
            dst.push(TAG_NODE);
            dst.extend_from_slice(&n.0.to_be_bytes());
        }
    }
}

/// Decodes one value, returning it with the number of bytes consumed.
pub fn decode_value(src: &[u8]) -> Result<(Value, usize)> {
    let tag = *src
        .first()
        .ok_or(UmbraError::Corruption("value record is empty"))?;
    let body = &src[1..];
    match tag {
        TAG_NIL => Ok((Value::Nil, 1)),
        TAG_BOOL => {
            let b = *body
                .first()
                .ok_or(UmbraError::Corruption("bool value truncated"))?;
            Ok((Value::Bool(b != 0), 2))
        }
        TAG_INT => {
            let v = i64::from_be_bytes(take8(body, "int value truncated")?);
            Ok((Value::Int(v), 9))
        }
        TAG_FLOAT => {
            let bits = u64::from_be_bytes(take8(body, "float value truncated")?);
            Ok((Value::Float(f64::from_bits(bits)), 9))
        }
        TAG_STR => {
            let (s, used) = read_str(body)?;
            Ok((Value::Str(s), 1 + used))
        }
        TAG_KW => {
            let (ns, ns_used) = read_str(body)?;
            let (name, name_used) = read_str(&body[ns_used..])?;
            let kw = if ns.is_empty() {
                Keyword::plain(name)
            } else {
                Keyword::new(ns, name)
            };
            Ok((Value::Kw(kw), 1 + ns_used + name_used))
        }
        TAG_INST => {
            let millis = i64::from_be_bytes(take8(body, "inst value truncated")?);
            let inst = DateTime::<Utc>::from_timestamp_millis(millis)
                .ok_or(UmbraError::Corruption("inst value out of range"))?;
            Ok((Value::Inst(inst), 9))
        }
        TAG_NODE => {
            let id = u64::from_be_bytes(take8(body, "node value truncated")?);
            Ok((Value::Node(NodeId(id)), 9))
        }
        _ => Err(UmbraError::Corruption("unknown value tag")),
    }
}

fn push_str(dst: &mut Vec<u8>, s: &str) {
    dst.extend_from_slice(&(s.len() as u32).to_be_bytes());
    dst.extend_from_slice(s.as_bytes());
}

fn read_str(src: &[u8]) -> Result<(String, usize)> {
    if src.len() < 4 {
        return Err(UmbraError::Corruption("string length truncated"));
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    let end = 4 + len;
    if src.len() < end {
        return Err(UmbraError::Corruption("string payload truncated"));
    }
    let s = std::str::from_utf8(&src[4..end])
        .map_err(|_| UmbraError::Corruption("string payload is not utf-8"))?;
    Ok((s.to_owned(), end))
}

fn take8(src: &[u8], msg: &'static str) -> Result<[u8; 8]> {
    src.get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(UmbraError::Corruption(msg))
}
