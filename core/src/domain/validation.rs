//! Port and PID validation.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Largest span `validate_port_range` accepts unless told otherwise.
pub const DEFAULT_MAX_RANGE_SIZE: usize = 1000;

/// Parse and range-check a port given as text.
pub fn validate_port(input: &str) -> Result<u16> {
    let trimmed = input.trim();
    let number: i64 = trimmed.parse().map_err(|_| Error::InvalidPort {
        value: input.to_string(),
        reason: "not an integer".to_string(),
    })?;
    validate_port_number(number).map_err(|e| match e {
        Error::InvalidPort { reason, .. } => Error::InvalidPort {
            value: trimmed.to_string(),
            reason,
        },
        other => other,
    })
}

/// Range-check a numeric port.
pub fn validate_port_number(number: i64) -> Result<u16> {
    if !(1..=65535).contains(&number) {
        return Err(Error::InvalidPort {
            value: number.to_string(),
            reason: "must be between 1 and 65535".to_string(),
        });
    }
    Ok(number as u16)
}

/// Expand an inclusive `start-end` range.
///
/// Rejects spans larger than `max_size` so a typo like `1-65535` cannot
/// turn into tens of thousands of lookups.
pub fn validate_port_range(range: &str, max_size: usize) -> Result<Vec<u16>> {
    let invalid = |reason: &str| Error::InvalidPort {
        value: range.to_string(),
        reason: reason.to_string(),
    };

    let (start, end) = range
        .trim()
        .split_once('-')
        .ok_or_else(|| invalid("expected a range like 3000-3005"))?;

    let start = validate_port(start)?;
    let end = validate_port(end)?;

    if start > end {
        return Err(invalid("range start is greater than range end"));
    }

    let span = usize::from(end - start) + 1;
    if span > max_size {
        return Err(invalid(&format!(
            "range covers {} ports, maximum is {}",
            span, max_size
        )));
    }

    Ok((start..=end).collect())
}

/// Parse CLI-style port arguments.
///
/// Each argument may be a port, a range, or a comma-separated list of
/// either. Duplicates are dropped, first occurrence wins.
pub fn parse_port_args<S: AsRef<str>>(args: &[S], max_range_size: usize) -> Result<Vec<u16>> {
    let mut seen = HashSet::new();
    let mut ports = Vec::new();

    for arg in args {
        for part in arg.as_ref().split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let expanded = if part.contains('-') {
                validate_port_range(part, max_range_size)?
            } else {
                vec![validate_port(part)?]
            };
            ports.extend(expanded.into_iter().filter(|p| seen.insert(*p)));
        }
    }

    Ok(ports)
}

/// Check that a PID can be signalled without addressing a process group.
///
/// PID 0 and anything above `i32::MAX` (which would wrap to a negative
/// `pid_t`) are rejected.
pub fn validate_pid(pid: u32) -> Result<u32> {
    if pid == 0 || pid > i32::MAX as u32 {
        return Err(Error::InvalidPid(pid));
    }
    Ok(pid)
}
