//! Handler text-value types (spec.md §6 "Handler text types").
//!
//! Every parser is paired with a formatter so handlers can round-trip a
//! value through text without the caller needing to know the underlying
//! binary representation.

use std::time::Duration;

pub fn format_bool(b: bool) -> String {
    if b { "true".to_string() } else { "false".to_string() }
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("not a boolean: {other:?}")),
    }
}

pub fn parse_integer(s: &str) -> Result<i64, String> {
    s.trim().parse::<i64>().map_err(|_| format!("not an integer: {s:?}"))
}

pub fn format_integer(n: i64) -> String {
    n.to_string()
}

/// Parses `"<sec>"`, `"<sec>.<frac>"`, or a value with a unit suffix
/// (`s`, `ms`, `us`, `ns`) into a `Duration`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    for (suffix, scale) in [("ns", 1e-9), ("us", 1e-6), ("ms", 1e-3), ("s", 1.0)] {
        if let Some(num) = s.strip_suffix(suffix) {
            let v: f64 = num.trim().parse().map_err(|_| format!("bad duration {s:?}"))?;
            return Ok(Duration::from_secs_f64(v * scale));
        }
    }
    let v: f64 = s.parse().map_err(|_| format!("bad duration {s:?}"))?;
    Ok(Duration::from_secs_f64(v))
}

pub fn format_duration(d: Duration) -> String {
    format!("{}.{:09}", d.as_secs(), d.subsec_nanos())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    pub fn parse(s: &str) -> Result<Ipv4Addr, String> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 4 {
            return Err(format!("not an IPv4 address: {s:?}"));
        }
        let mut out = [0u8; 4];
        for (i, p) in parts.iter().enumerate() {
            out[i] = p.parse::<u8>().map_err(|_| format!("not an IPv4 address: {s:?}"))?;
        }
        Ok(Ipv4Addr(out))
    }

    pub fn format(&self) -> String {
        self.0.iter().map(u8::to_string).collect::<Vec<_>>().join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Prefix {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Ipv4Prefix {
    pub fn parse(s: &str) -> Result<Ipv4Prefix, String> {
        let (addr, len) = s.split_once('/').ok_or_else(|| format!("not a prefix: {s:?}"))?;
        let len: u8 = len.parse().map_err(|_| format!("bad prefix length: {len:?}"))?;
        if len > 32 {
            return Err(format!("prefix length out of range: {len}"));
        }
        Ok(Ipv4Prefix { addr: Ipv4Addr::parse(addr)?, len })
    }

    pub fn format(&self) -> String {
        format!("{}/{}", self.addr.format(), self.len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetAddr(pub [u8; 6]);

impl EthernetAddr {
    pub fn parse(s: &str) -> Result<EthernetAddr, String> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(format!("not an Ethernet address: {s:?}"));
        }
        let mut out = [0u8; 6];
        for (i, p) in parts.iter().enumerate() {
            out[i] = u8::from_str_radix(p, 16).map_err(|_| format!("not an Ethernet address: {s:?}"))?;
        }
        Ok(EthernetAddr(out))
    }

    pub fn format(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
    }
}

/// Splits a whitespace-separated list, honoring `"..."` quoting for tokens
/// that contain whitespace.
pub fn parse_list(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.trim().chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn format_list(items: &[String]) -> String {
    items
        .iter()
        .map(|tok| {
            if tok.chars().any(char::is_whitespace) {
                format!("\"{tok}\"")
            } else {
                tok.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_round_trips_case_insensitive_input() {
        assert_eq!(parse_bool("YES").unwrap(), true);
        assert_eq!(parse_bool("0").unwrap(), false);
        assert_eq!(format_bool(parse_bool("true").unwrap()), "true");
    }

    #[test]
    fn duration_parses_unit_suffixes() {
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2.5s").unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn ipv4_round_trips() {
        let a = Ipv4Addr::parse("10.0.0.1").unwrap();
        assert_eq!(a.format(), "10.0.0.1");
    }

    #[test]
    fn ipv4_prefix_round_trips() {
        let p = Ipv4Prefix::parse("192.168.1.0/24").unwrap();
        assert_eq!(p.len, 24);
        assert_eq!(p.format(), "192.168.1.0/24");
    }

    #[test]
    fn ethernet_address_round_trips() {
        let e = EthernetAddr::parse("AA:bb:01:02:03:04").unwrap();
        assert_eq!(e.format(), "aa:bb:01:02:03:04");
    }

    #[test]
    fn list_honors_quoted_whitespace_tokens() {
        let items = parse_list(r#"alpha "beta gamma" delta"#);
        assert_eq!(items, vec!["alpha", "beta gamma", "delta"]);
        assert_eq!(format_list(&items), r#"alpha "beta gamma" delta"#);
    }
}
