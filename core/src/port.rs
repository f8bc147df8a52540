//! Port counts and per-port flow declarations (spec.md §3 "Port and
//! Connection", §4.C "Flow-direction solver").

use std::fmt;

/// How many ports a side of an element declares, parsed from strings like
/// `"1"`, `"1-"`, `"0-1"`, `"2-4"` (spec.md's `"1/1"`, `"1-/1-"`, `"0/0-1"`
/// examples, one side each).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortCount {
    Fixed(u32),
    AtLeast(u32),
    Range(u32, u32),
}

impl PortCount {
    pub fn parse(s: &str) -> Result<PortCount, String> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix('-') {
            let n: u32 = stripped.parse().map_err(|_| format!("bad port count {s:?}"))?;
            return Ok(PortCount::AtLeast(n));
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| format!("bad port count {s:?}"))?;
            let hi: u32 = hi.parse().map_err(|_| format!("bad port count {s:?}"))?;
            return Ok(PortCount::Range(lo, hi));
        }
        let n: u32 = s.parse().map_err(|_| format!("bad port count {s:?}"))?;
        Ok(PortCount::Fixed(n))
    }

    pub fn accepts(&self, n: u32) -> bool {
        match *self {
            PortCount::Fixed(f) => n == f,
            PortCount::AtLeast(f) => n >= f,
            PortCount::Range(lo, hi) => n >= lo && n <= hi,
        }
    }

    /// The minimum port count this descriptor is satisfied by; used when an
    /// element is instantiated without an explicit port count override.
    pub fn minimum(&self) -> u32 {
        match *self {
            PortCount::Fixed(f) => f,
            PortCount::AtLeast(f) => f,
            PortCount::Range(lo, _) => lo,
        }
    }
}

impl fmt::Display for PortCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PortCount::Fixed(n) => write!(f, "{n}"),
            PortCount::AtLeast(n) => write!(f, "{n}-"),
            PortCount::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// An element's full port-count descriptor, e.g. `"1/1"` or `"1-/1-"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub inputs: PortCount,
    pub outputs: PortCount,
}

impl PortSpec {
    pub fn parse(s: &str) -> Result<PortSpec, String> {
        let (lhs, rhs) = s.split_once('/').ok_or_else(|| format!("port spec {s:?} missing '/'"))?;
        Ok(PortSpec {
            inputs: PortCount::parse(lhs)?,
            outputs: PortCount::parse(rhs)?,
        })
    }
}

/// Per-port resolved flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Push,
    Pull,
    Agnostic,
}

impl Flow {
    fn from_char(c: char) -> Result<Flow, String> {
        match c {
            'h' => Ok(Flow::Push),
            'l' => Ok(Flow::Pull),
            'a' => Ok(Flow::Agnostic),
            other => Err(format!("unknown processing code {other:?}")),
        }
    }
}

/// Per-port processing declaration, e.g. `"a/a"`, `"h/h"`, `"h/l"`. Each
/// side is a comma-separated list of codes; a port index past the list's
/// length repeats the list's last entry (Click's shorthand for "all the
/// rest behave like the last one named").
#[derive(Debug, Clone)]
pub struct Processing {
    inputs: Vec<Flow>,
    outputs: Vec<Flow>,
}

impl Processing {
    pub fn parse(s: &str) -> Result<Processing, String> {
        let (lhs, rhs) = s.split_once('/').ok_or_else(|| format!("processing spec {s:?} missing '/'"))?;
        let parse_side = |side: &str| -> Result<Vec<Flow>, String> {
            side.split(',').map(|tok| {
                let tok = tok.trim();
                let c = tok.chars().next().ok_or_else(|| "empty processing code".to_string())?;
                Flow::from_char(c)
            }).collect()
        };
        Ok(Processing {
            inputs: parse_side(lhs)?,
            outputs: parse_side(rhs)?,
        })
    }

    pub fn input_flow(&self, port: usize) -> Flow {
        *self.inputs.get(port).unwrap_or_else(|| self.inputs.last().unwrap())
    }

    pub fn output_flow(&self, port: usize) -> Flow {
        *self.outputs.get(port).unwrap_or_else(|| self.outputs.last().unwrap())
    }
}
