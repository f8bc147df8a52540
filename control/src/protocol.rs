//! ControlSocket wire protocol (spec.md §4.I, §6).
//!
//! Parsing and response formatting are pure functions over already-framed
//! input; `socket.rs` owns the actual byte stream and `WRITEDATA` framing
//! (reading exactly N raw bytes is not line-oriented, so it can't happen
//! inside a line parser).

use crate::handler::HandlerTable;

pub const BANNER_MAJOR: u32 = 1;
pub const BANNER_MINOR: u32 = 0;

pub fn banner() -> String {
    format!("Click::ControlSocket/{BANNER_MAJOR}.{BANNER_MINOR}\r\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 200,
    OkWarning = 220,
    Syntax = 500,
    Unimplemented = 501,
    NoElement = 510,
    NoHandler = 511,
    HandlerError = 520,
    PermissionDenied = 530,
    NoRouter = 540,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read { target: String },
    Write { target: String, data: String },
    WriteData { target: String, len: usize },
    CheckRead { target: String },
    CheckWrite { target: String },
    Quit,
    Unknown(String),
}

/// Parses one command line (without the trailing `\n`). `WRITEDATA`'s
/// length is parsed but its payload is read separately by the caller.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches('\r');
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest = parts.next().unwrap_or("").trim();
    match verb.as_str() {
        "READ" => Command::Read { target: rest.to_string() },
        "WRITE" => {
            let mut it = rest.splitn(2, ' ');
            let target = it.next().unwrap_or("").to_string();
            let data = it.next().unwrap_or("").to_string();
            Command::Write { target, data }
        }
        "WRITEDATA" => {
            let mut it = rest.rsplitn(2, ' ');
            let len_str = it.next().unwrap_or("");
            let target = it.next().unwrap_or("").to_string();
            match len_str.trim().parse::<usize>() {
                Ok(len) => Command::WriteData { target, len },
                Err(_) => Command::Unknown(line.to_string()),
            }
        }
        "CHECKREAD" => Command::CheckRead { target: rest.to_string() },
        "CHECKWRITE" => Command::CheckWrite { target: rest.to_string() },
        "QUIT" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn one_liner(code: Code, text: &str) -> String {
    format!("{} {}\r\n", code as i32, text)
}

/// Formats a successful read response: a status line followed by
/// `DATA <N>\n<N bytes>` (spec.md Testable Property 7: length is the exact
/// byte count, the body is not newline-terminated beyond what it contains).
fn read_success(value: &str) -> Vec<u8> {
    let mut out = format!("{} Read handler value follows\r\n", Code::Ok as i32).into_bytes();
    out.extend_from_slice(format!("DATA {}\r\n", value.len()).as_bytes());
    out.extend_from_slice(value.as_bytes());
    out
}

fn split_target(target: &str) -> Option<(&str, &str)> {
    let pos = target.rfind('.')?;
    Some((&target[..pos], &target[pos + 1..]))
}

/// Executes one parsed command against the router and handler table,
/// returning the raw response bytes to write back to the client.
pub fn execute(
    command: &Command,
    router: &router_core::Router,
    table: &HandlerTable,
) -> Vec<u8> {
    match command {
        Command::Read { target } => {
            let Some((elem_name, handler)) = split_target(target) else {
                return one_liner(Code::Syntax, "syntax error").into_bytes();
            };
            let Some(elem_idx) = router.index_of(elem_name) else {
                return one_liner(Code::NoElement, "no such element").into_bytes();
            };
            let qualified = format!("{elem_name}.{handler}");
            let Some(info) = table.lookup(&qualified) else {
                return one_liner(Code::NoHandler, "no such handler").into_bytes();
            };
            if !info.flags.readable {
                return one_liner(Code::NoHandler, "handler not readable").into_bytes();
            }
            match router.read_handler(elem_idx, handler) {
                Some(value) => read_success(&value),
                None => one_liner(Code::HandlerError, "handler returned error").into_bytes(),
            }
        }
        Command::Write { target, data } => execute_write(target, data, router, table),
        Command::WriteData { target, .. } => {
            // The payload has already been collected by the caller and
            // folded into an equivalent Write by the time we reach here in
            // the normal socket flow; treat a bare WriteData as if the
            // caller forgot to supply data.
            execute_write(target, "", router, table)
        }
        Command::CheckRead { target } => check(target, table, true),
        Command::CheckWrite { target } => check(target, table, false),
        Command::Quit => Vec::new(),
        Command::Unknown(_) => one_liner(Code::Syntax, "syntax error").into_bytes(),
    }
}

pub(crate) fn execute_write(target: &str, data: &str, router: &router_core::Router, table: &HandlerTable) -> Vec<u8> {
    let Some((elem_name, handler)) = split_target(target) else {
        return one_liner(Code::Syntax, "syntax error").into_bytes();
    };
    let Some(elem_idx) = router.index_of(elem_name) else {
        return one_liner(Code::NoElement, "no such element").into_bytes();
    };
    let qualified = format!("{elem_name}.{handler}");
    let Some(info) = table.lookup(&qualified) else {
        return one_liner(Code::NoHandler, "no such handler").into_bytes();
    };
    if !info.flags.writable {
        return one_liner(Code::NoHandler, "handler not writable").into_bytes();
    }
    match router.write_handler(elem_idx, handler, data) {
        Ok(()) => one_liner(Code::Ok, "write handler OK").into_bytes(),
        Err(msg) => one_liner(Code::HandlerError, &msg).into_bytes(),
    }
}

fn check(target: &str, table: &HandlerTable, want_read: bool) -> Vec<u8> {
    let Some((elem_name, handler)) = split_target(target) else {
        return one_liner(Code::Syntax, "syntax error").into_bytes();
    };
    let qualified = format!("{elem_name}.{handler}");
    match table.lookup(&qualified) {
        Some(info) if want_read && info.flags.readable => one_liner(Code::Ok, "OK").into_bytes(),
        Some(info) if !want_read && info.flags.writable => one_liner(Code::Ok, "OK").into_bytes(),
        Some(_) => one_liner(Code::NoHandler, "handler does not support this operation").into_bytes(),
        None => one_liner(Code::NoHandler, "no such handler").into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_command() {
        assert_eq!(parse_command("READ c.count"), Command::Read { target: "c.count".into() });
    }

    #[test]
    fn parses_write_command_with_inline_data() {
        assert_eq!(
            parse_command("WRITE q.limit 500"),
            Command::Write { target: "q.limit".into(), data: "500".into() }
        );
    }

    #[test]
    fn parses_writedata_length_suffix() {
        assert_eq!(
            parse_command("WRITEDATA e.blob 128"),
            Command::WriteData { target: "e.blob".into(), len: 128 }
        );
    }

    #[test]
    fn banner_matches_expected_major_minor() {
        assert!(banner().starts_with("Click::ControlSocket/1.0"));
    }

    #[test]
    fn read_success_framing_reports_exact_byte_count() {
        let resp = read_success("5\n");
        let text = String::from_utf8(resp).unwrap();
        assert!(text.contains("DATA 2\r\n5\n"));
    }
}
