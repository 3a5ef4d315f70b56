//! Dumps every value of a VOM stream with its wire type.
//!
//! Without an argument, writes a small sample stream and inspects that.

use std::fs;
use std::time::{Duration, SystemTime};

use vom::bridge::{format_rfc3339, Native};
use vom::model::{Any, Value};
use vom::{vdl_struct, Decoder, Encoder, RemoteError, RetryCode, Type};

struct Sample {
    name: String,
    tags: Vec<String>,
    taken: SystemTime,
    exposure: Duration,
}

vdl_struct!(Sample = "demo.Sample" {
    name: String as "Name",
    tags: Vec<String> as "Tags",
    taken: SystemTime as "Taken",
    exposure: Duration as "Exposure",
});

fn sample_stream() -> Vec<u8> {
    let mut enc = Encoder::new(Vec::new());
    let sample = Sample {
        name: "first light".to_string(),
        tags: vec!["sky".to_string(), "night".to_string()],
        taken: SystemTime::now(),
        exposure: Duration::from_millis(2500),
    };
    enc.encode(&sample).expect("encode sample");
    enc.encode(&vec![1u8, 2, 3]).expect("encode bytes");
    let err = RemoteError::new("demo.Timeout", "sensor did not answer")
        .with_action(RetryCode::RetryBackoff)
        .with_param(Any::new(Type::uint32(), Value::Uint32(30)));
    enc.encode(&err).expect("encode error");
    enc.into_inner()
}

fn format_value(ty: Type, value: &Value) -> String {
    if ty.name() == "time.Time" {
        if let Value::Struct(fields) = value {
            if let [Value::Int64(seconds), Value::Int32(nanos)] = fields.as_slice() {
                let wire = vom::bridge::WireTime {
                    seconds: *seconds,
                    nanos: *nanos,
                };
                return format!("time({})", format_rfc3339(&wire));
            }
        }
    }
    match value {
        Value::String(s) => {
            let preview: String = s.chars().take(60).collect();
            if s.chars().count() > 60 {
                format!("{preview:?}...")
            } else {
                format!("{preview:?}")
            }
        }
        Value::Bytes(b) => format!("BYTES[{}]", b.len()),
        Value::Enum(index) => ty
            .labels()
            .get(*index)
            .cloned()
            .unwrap_or_else(|| format!("#{index}")),
        Value::List(items) | Value::Array(items) | Value::Set(items) => {
            let elem = ty.elem().or(ty.key()).unwrap_or(Type::any());
            let parts: Vec<_> = items.iter().map(|v| format_value(elem, v)).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(pairs) => {
            let key = ty.key().unwrap_or(Type::any());
            let elem = ty.elem().unwrap_or(Type::any());
            let parts: Vec<_> = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", format_value(key, k), format_value(elem, v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Struct(fields) => {
            let parts: Vec<_> = ty
                .fields()
                .iter()
                .zip(fields)
                .map(|(f, v)| format!("{}: {}", f.name, format_value(f.ty, v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Union(index, inner) => match ty.field(*index) {
            Some(f) => format!("{}({})", f.name, format_value(f.ty, inner)),
            None => format!("#{index}(?)"),
        },
        Value::Optional(None) => "nil".to_string(),
        Value::Optional(Some(inner)) => format_value(ty.elem().unwrap_or(Type::any()), inner),
        Value::Any(any) => match (any.ty(), any.value()) {
            (Some(inner_ty), Some(inner)) => format!("any<{}>({})", inner_ty, format_value(inner_ty, inner)),
            _ => "nil".to_string(),
        },
        other => format!("{other:?}"),
    }
}

fn main() {
    let data = match std::env::args().nth(1) {
        Some(path) => {
            println!("Reading: {path}");
            fs::read(&path).expect("Failed to read file")
        }
        None => {
            println!("Reading: built-in sample stream");
            sample_stream()
        }
    };
    println!("Stream size: {} bytes", data.len());

    let mut dec = Decoder::new(data.as_slice());
    let mut count = 0;
    while !dec.is_at_end().expect("Failed to read stream") {
        let any = dec.decode_any().expect("Failed to decode");
        count += 1;
        match (any.ty(), any.value()) {
            (Some(ty), Some(value)) => {
                println!("\n=== Value {count} ===");
                println!("Type: {}", ty.unique());
                println!("Value: {}", format_value(ty, value));
                if let Ok(Some(native)) = vom::registry::native_from_value(ty, value.clone()) {
                    if let Some(err) = native.downcast_ref::<RemoteError>() {
                        println!("Native: RemoteError({err}, retry {:?})", err.action);
                    }
                }
            }
            _ => println!("\n=== Value {count} === nil"),
        }
    }
    println!("\n{count} values");

    // Wire time of "now", for reference.
    println!("now = {}", format_rfc3339(&SystemTime::now().to_wire()));
}
