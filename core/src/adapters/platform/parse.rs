//! Parsing helpers shared by the platform adapters.

/// Commands longer than this are truncated in `ProcessInfo::command`.
const MAX_COMMAND_LEN: usize = 200;

/// Parse an address:port string.
///
/// Handles multiple address formats:
/// - IPv4: "127.0.0.1:3000" or "*:8080"
/// - IPv6: "\[::1]:3000", "\[fe80::1]%eth0:546"
/// - Connected sockets: "127.0.0.1:5353->10.0.0.1:53" (local side is used)
pub fn parse_address(address: &str) -> Option<(String, u16)> {
    let address = address.split("->").next()?;

    if address.starts_with('[') {
        // IPv6 format: [::1]:3000, optionally with a %scope after the bracket
        let bracket_end = address.find(']')?;
        let rest = &address[bracket_end + 1..];
        let (_, port_str) = rest.rsplit_once(':')?;
        let port: u16 = port_str.parse().ok()?;
        Some((address[..=bracket_end].to_string(), port))
    } else {
        // IPv4 format: 127.0.0.1:3000 or *:8080
        let (addr, port_str) = address.rsplit_once(':')?;
        let port: u16 = port_str.parse().ok()?;
        let addr = if addr.is_empty() { "*" } else { addr };
        Some((addr.to_string(), port))
    }
}

/// Parse a BSD netstat address, where the port follows the last dot.
///
/// Examples: "127.0.0.1.3000", "*.5353", "fe80::1%lo0.123".
pub fn parse_dotted_address(address: &str) -> Option<(String, u16)> {
    let (addr, port_str) = address.rsplit_once('.')?;
    let port: u16 = port_str.parse().ok()?;
    Some((addr.to_string(), port))
}

/// Decode escaped characters in lsof output.
///
/// lsof escapes special characters in process names:
/// - `\x20` -> space
/// - `\x2f` -> forward slash
/// - Other hex escapes like `\xNN`
pub fn decode_escaped(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' || chars.peek() != Some(&'x') {
            result.push(c);
            continue;
        }

        let mut lookahead = chars.clone();
        lookahead.next();
        let hex: String = lookahead.by_ref().take(2).collect();
        match u8::from_str_radix(&hex, 16) {
            Ok(byte) if hex.len() == 2 => {
                result.push(char::from(byte));
                chars = lookahead;
            }
            _ => result.push(c),
        }
    }

    result
}

/// Truncate long command lines, keeping a char boundary.
pub fn truncate_command(command: &str) -> String {
    if command.len() <= MAX_COMMAND_LEN {
        return command.to_string();
    }
    let mut end = MAX_COMMAND_LEN;
    while !command.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &command[..end])
}

/// Parse a CSV line, handling quoted fields.
///
/// Used for `tasklist /FO CSV` output, where every field is quoted:
/// `"node.exe","5432","Console","1","45,000 K"`.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields.into_iter().map(|f| f.trim().to_string()).collect()
}
