//! Membership snapshot codec.
//!
//! A `DISCOVER` response is zero or more lines:
//!
//! ```text
//! <username>:<host>:<port>
//! ```
//!
//! newline-joined, unordered, with no framing beyond connection close.
//! Usernames cannot contain `:`, so parsing splits the username at the
//! first colon and the port at the last; everything in between is the
//! host, which keeps bracketless IPv6 hosts intact.

use std::net::{IpAddr, SocketAddr};

use veilchat_types::{PeerRecord, Result, VeilchatError};

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encodes a snapshot as newline-joined records.
pub fn encode_snapshot(records: &[PeerRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}:{}:{}", r.username, r.addr.ip(), r.addr.port()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parses a snapshot body into peer records.
///
/// Blank lines are skipped; a malformed record fails the whole
/// snapshot with [`VeilchatError::Protocol`] (a half-applied snapshot
/// would leave the peer table inconsistent).
pub fn parse_snapshot(body: &str) -> Result<Vec<PeerRecord>> {
    let mut records = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        records.push(parse_record(line)?);
    }
    Ok(records)
}

/// Parses one `<username>:<host>:<port>` record.
fn parse_record(line: &str) -> Result<PeerRecord> {
    let (username, rest) = line.split_once(':').ok_or_else(|| {
        VeilchatError::Protocol {
            reason: format!("snapshot record missing username separator: {line:?}"),
        }
    })?;
    let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
        VeilchatError::Protocol {
            reason: format!("snapshot record missing port separator: {line:?}"),
        }
    })?;

    let username = username.parse()?;
    let ip: IpAddr = host.parse().map_err(|_| VeilchatError::Protocol {
        reason: format!("invalid host in snapshot record: {host:?}"),
    })?;
    let port: u16 = port.parse().map_err(|_| VeilchatError::Protocol {
        reason: format!("invalid port in snapshot record: {port:?}"),
    })?;

    Ok(PeerRecord {
        username,
        addr: SocketAddr::new(ip, port),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(username: &str, addr: &str) -> PeerRecord {
        PeerRecord {
            username: username.parse().expect("valid username"),
            addr: addr.parse().expect("valid address"),
        }
    }

    #[test]
    fn empty_snapshot() -> Result<()> {
        assert_eq!(encode_snapshot(&[]), "");
        assert!(parse_snapshot("")?.is_empty());
        Ok(())
    }

    #[test]
    fn roundtrip_two_records() -> Result<()> {
        let records = vec![
            record("alice", "10.0.0.1:9100"),
            record("bob", "10.0.0.2:9200"),
        ];
        let parsed = parse_snapshot(&encode_snapshot(&records))?;
        assert_eq!(parsed, records);
        Ok(())
    }

    #[test]
    fn parses_ipv6_host() -> Result<()> {
        let parsed = parse_snapshot("carol:2001:db8::1:9300")?;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].username.as_str(), "carol");
        assert_eq!(parsed[0].addr, "[2001:db8::1]:9300".parse().unwrap());
        Ok(())
    }

    #[test]
    fn skips_blank_lines() -> Result<()> {
        let parsed = parse_snapshot("alice:10.0.0.1:9100\n\nbob:10.0.0.2:9200\n")?;
        assert_eq!(parsed.len(), 2);
        Ok(())
    }

    #[test]
    fn rejects_missing_port() {
        let err = parse_snapshot("alice:10.0.0.1").unwrap_err();
        assert!(matches!(err, VeilchatError::Protocol { .. }));
    }

    #[test]
    fn rejects_bad_host() {
        let err = parse_snapshot("alice:not-a-host:9100").unwrap_err();
        assert!(matches!(err, VeilchatError::Protocol { .. }));
    }

    #[test]
    fn malformed_record_fails_whole_snapshot() {
        let body = "alice:10.0.0.1:9100\ngarbage\n";
        assert!(parse_snapshot(body).is_err());
    }
}
