//! Command execution.

use crate::config::{Config, OutputFormat};
use crate::error::CliError;
use crate::Commands;
use binrpc_protocol::json::{from_json, to_json};
use binrpc_protocol::{
    decode_frame_with, encode_frame_with, parse_header, Direction, Fault, Frame, Recovery,
    Request, Response, Value, FRAME_HEADER_SIZE,
};
use colored::Colorize;
use std::io::Read;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands, config: &Config) -> Result<String, CliError> {
    match cmd {
        Commands::Decode { input, plain } => {
            let bytes = read_frame_input(&input)?;
            if plain {
                decode_plain(&bytes, config)
            } else {
                decode_message(&bytes, config)
            }
        }

        Commands::Encode { values, response } => {
            let values = values
                .iter()
                .map(|arg| parse_json_arg(arg).map(|json| from_json(&json)))
                .collect::<Result<Vec<_>, _>>()?;
            let direction = if response {
                Direction::Response
            } else {
                Direction::Request
            };
            let frame = encode_frame_with(direction, &values, config.charset())?;
            Ok(hex::encode(frame))
        }

        Commands::Request { method, params } => {
            let params = params
                .iter()
                .map(|arg| parse_json_arg(arg).map(|json| from_json(&json)))
                .collect::<Result<Vec<_>, _>>()?;
            let request = Request::new(method, params);
            let frame = Frame::new(Direction::Request, request.encode_payload(config.charset()))?;
            Ok(hex::encode(frame.encode()?))
        }

        Commands::Response { value, fault } => {
            let response = match (value, fault) {
                (_, Some(fault)) => {
                    let [code, message] = <[String; 2]>::try_from(fault).map_err(|_| {
                        CliError::Usage("--fault expects CODE and MESSAGE".to_string())
                    })?;
                    let code = code.parse::<i32>().map_err(|_| {
                        CliError::Usage(format!("fault code must be an integer, got {code}"))
                    })?;
                    Response::Fault(Fault::new(code, message))
                }
                (Some(value), None) => Response::Success(from_json(&parse_json_arg(&value)?)),
                (None, None) => Response::empty(),
            };
            let frame =
                Frame::new(Direction::Response, response.encode_payload(config.charset()))?;
            Ok(hex::encode(frame.encode()?))
        }

        Commands::Config => Ok(config.to_yaml()?),
    }
}

/// Decodes the payload as a sequence of tagged values.
fn decode_plain(bytes: &[u8], config: &Config) -> Result<String, CliError> {
    let decoded = decode_frame_with(bytes, config.decode_options())?;

    let mut output = header_line(decoded.direction, decoded.declared_length, decoded.payload_length);
    for (i, value) in decoded.values.iter().enumerate() {
        output.push_str(&format!("\n{} {}", format!("[{}]", i).dimmed(), format_value(value, config)));
    }
    output.push_str(&format_recoveries(&decoded.recoveries));
    Ok(output)
}

/// Decodes the payload as a method call or method result.
fn decode_message(bytes: &[u8], config: &Config) -> Result<String, CliError> {
    let frame = Frame::decode(bytes)?;
    let payload_length = frame.payload.len();
    let mut output = header_line(frame.direction, frame.declared_length, payload_length);

    let recoveries = match frame.direction {
        Direction::Request => {
            let (request, recoveries) =
                Request::decode_payload(&frame.payload, config.decode_options())?;
            output.push_str(&format!("\n{} {}", "method:".bold(), request.method.cyan()));
            output.push_str(&format!(
                "\n{} {}",
                "params:".bold(),
                format_value(&Value::Array(request.params), config)
            ));
            recoveries
        }
        Direction::Response => {
            let (response, recoveries) =
                Response::decode_payload(&frame.payload, config.decode_options())?;
            match response {
                Response::Success(value) => output.push_str(&format!(
                    "\n{} {}",
                    "result:".bold(),
                    format_value(&value, config)
                )),
                Response::Fault(fault) => {
                    output.push_str(&format!("\n{} {}", "fault:".red().bold(), fault))
                }
            }
            recoveries
        }
    };

    output.push_str(&format_recoveries(&recoveries));
    Ok(output)
}

fn header_line(direction: Direction, declared: u32, actual: usize) -> String {
    let mut line = format!(
        "{} {}, declared {} bytes, received {} bytes",
        "Bin".bold(),
        direction.to_string().green(),
        declared,
        actual
    );
    if declared as usize != actual {
        line.push_str(&format!(" {}", "(length mismatch)".yellow()));
    }
    line
}

fn format_recoveries(recoveries: &[Recovery]) -> String {
    recoveries
        .iter()
        .map(|r| format!("\n{} {}", "recovered:".yellow(), r))
        .collect()
}

/// Formats a value as JSON for display.
fn format_value(value: &Value, config: &Config) -> String {
    let json = to_json(value);
    match config.output {
        OutputFormat::Pretty => serde_json::to_string_pretty(&json),
        OutputFormat::Compact => serde_json::to_string(&json),
    }
    .unwrap_or_else(|_| value.to_string())
}

/// Reads a frame from hex, `@file` (raw bytes) or `-` (hex on stdin).
fn read_frame_input(input: &str) -> Result<Vec<u8>, CliError> {
    let bytes = if let Some(path) = input.strip_prefix('@') {
        std::fs::read(path)?
    } else if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        parse_hex(&text)?
    } else {
        parse_hex(input)?
    };

    // Fail early with a readable message instead of a bare length error.
    if bytes.len() < FRAME_HEADER_SIZE {
        parse_header(&bytes)?;
    }
    Ok(bytes)
}

/// Parses hex, ignoring whitespace and an optional 0x prefix.
fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let cleaned: String = text.split_whitespace().collect();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);
    Ok(hex::decode(cleaned)?)
}

/// Parses a JSON argument; supports @file.json syntax.
fn parse_json_arg(arg: &str) -> Result<serde_json::Value, CliError> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}
