//! Payload fixtures shared by the binrpc benchmarks.

use binrpc_protocol::{MulticallCall, Request, Value};

/// An `event` call as CCUs send it for every datapoint change.
pub fn event_request(value: Value) -> Request {
    Request::new(
        "event",
        vec![
            Value::from("BidCos-RF"),
            Value::from("MEQ0123456:1"),
            Value::from("LEVEL"),
            value,
        ],
    )
}

/// A `listDevices` result with `count` device descriptions.
pub fn device_list(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                Value::structure([
                    ("ADDRESS", Value::Str(format!("CUX28010{:02}:1", i % 100))),
                    ("TYPE", Value::from("SWITCH")),
                    ("FLAGS", Value::Integer(1)),
                    ("VERSION", Value::Integer(12)),
                    ("LEVEL", Value::Double(0.01 * (i % 100) as f64)),
                    (
                        "PARAMSETS",
                        Value::Array(vec![Value::from("MASTER"), Value::from("VALUES")]),
                    ),
                ])
            })
            .collect(),
    )
}

/// A `system.multicall` request batching `count` getValue calls.
pub fn multicall_request(count: usize) -> Request {
    let calls: Vec<_> = (0..count)
        .map(|i| {
            MulticallCall::new(
                "getValue",
                vec![Value::Str(format!("CUX28010{:02}:1", i % 100)), Value::from("STATE")],
            )
        })
        .collect();
    Request::multicall(&calls)
}
