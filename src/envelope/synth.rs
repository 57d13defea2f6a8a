//! Synthetic EPP error responses for proxy-side failures.
//!
//! When an exchange fails (timeout, transport error, broken session) the
//! client still deserves a well-formed EPP response. The synthesizer builds
//! a minimal one: code 2500, a human-readable message, the client's own
//! transaction id when it can be recovered from the failed request, and a
//! freshly derived server transaction id.

use sha2::{Digest, Sha256};

use quick_xml::escape::escape;

use super::Envelope;
use crate::core::constants::{EPP_NS, RESULT_SESSION_ERROR};

/// Hex characters kept from the digest; comfortably inside the 64-character
/// clTRID/svTRID bound of the EPP schema.
const TRANSACTION_ID_LEN: usize = 32;

/// Derive a collision-resistant transaction id.
///
/// Hashes the caller's identity string with the nanosecond clock and the
/// process id. Uniqueness across proxies and restarts is the goal, not
/// secrecy.
pub fn transaction_id(identity: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();

    let digest = Sha256::digest(format!("{identity}:{nanos}:{pid}"));
    let mut id = hex::encode(digest);
    id.truncate(TRANSACTION_ID_LEN);
    id
}

/// Build a proxy-side EPP error response payload, ready for framing.
///
/// The original request is parsed only to recover its `clTRID`; an
/// unparseable request yields an empty `clTRID` element rather than failing
/// the synthesis.
pub fn synthesize(original_request: &[u8], error_text: &str) -> Vec<u8> {
    let envelope = Envelope::parse(original_request);
    let cl_trid = envelope.client_transaction_id().unwrap_or("");
    let sv_trid = transaction_id("eppmux");

    let mut doc = String::with_capacity(256 + error_text.len());
    doc.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.push_str(&format!(r#"<epp xmlns="{EPP_NS}"><response>"#));
    doc.push_str(&format!(
        r#"<result code="{RESULT_SESSION_ERROR}"><msg>{}</msg></result>"#,
        escape(error_text)
    ));
    doc.push_str(&format!(
        "<trID><clTRID>{}</clTRID><svTRID>{sv_trid}</svTRID></trID>",
        escape(cl_trid)
    ));
    doc.push_str("</response></epp>");
    doc.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_shape() {
        let id = transaction_id("test");
        assert_eq!(id.len(), TRANSACTION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_synthesized_frame_parses_back() {
        let request = br#"<epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><command>
            <poll op="req"/><clTRID>abc-123</clTRID></command></epp>"#;
        let payload = synthesize(request, "upstream exchange timed out after 5s");

        let envelope = Envelope::parse(&payload);
        assert_eq!(envelope.result_code(), 2500);
        assert_eq!(
            envelope.result_message(),
            "upstream exchange timed out after 5s"
        );
        assert_eq!(envelope.client_transaction_id(), Some("abc-123"));
    }

    #[test]
    fn test_unparseable_request_yields_empty_cltrid() {
        let payload = synthesize(b"\x00\x01 not xml", "upstream transport error: broken pipe");

        let envelope = Envelope::parse(&payload);
        assert_eq!(envelope.result_code(), 2500);
        assert_eq!(envelope.client_transaction_id(), None);
        assert!(String::from_utf8_lossy(&payload).contains("<clTRID></clTRID>"));
    }

    #[test]
    fn test_error_text_is_escaped() {
        let payload = synthesize(b"", "session <broken> & gone");
        let text = String::from_utf8_lossy(&payload);
        assert!(text.contains("session &lt;broken&gt; &amp; gone"));

        let envelope = Envelope::parse(&payload);
        assert_eq!(envelope.result_message(), "session <broken> & gone");
    }

    #[test]
    fn test_sv_trid_present() {
        let payload = synthesize(b"", "failure");
        let text = String::from_utf8_lossy(&payload);
        let start = text.find("<svTRID>").unwrap() + "<svTRID>".len();
        let end = text.find("</svTRID>").unwrap();
        assert_eq!(end - start, TRANSACTION_ID_LEN);
    }
}
