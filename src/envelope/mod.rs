//! EPP envelope inspection.
//!
//! The proxy is agnostic to EPP command content; the only XML it understands
//! is the generic envelope needed to manage the session: the `result` code,
//! the `result/msg` text, the `clTRID` transaction id, and the greeting's
//! `objURI` service menu.
//!
//! Every accessor is total: malformed or incomplete documents degrade to
//! defaults instead of failing. The sentinel code `2400` means "this response
//! could not be interpreted" and is distinct from any code a real server
//! would place in a well-formed frame.

mod synth;

pub use synth::*;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::core::constants::{
    EPP_NS, RESULT_AUTH_ERROR, RESULT_COMMAND_FAILED, RESULT_SESSION_ERROR, RESULT_SESSION_LIMIT,
};

/// Message text reported when a response carries no usable `result/msg`.
pub const UNKNOWN_MESSAGE: &str = "Unknown message";

/// True for the result codes that invalidate the whole session rather than
/// the individual command (RFC 5730 §3).
pub fn is_session_fatal(code: u16) -> bool {
    matches!(
        code,
        RESULT_SESSION_ERROR | RESULT_AUTH_ERROR | RESULT_SESSION_LIMIT
    )
}

/// Scalar fields pulled out of one EPP payload.
///
/// Produced by [`Envelope::parse`], which never fails: whatever could be
/// extracted before the first XML error is kept, and the accessors fill in
/// the protocol defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    result_code: Option<u16>,
    result_message: Option<String>,
    client_transaction_id: Option<String>,
}

/// Which element's text is currently being collected.
#[derive(PartialEq)]
enum Capture {
    None,
    Msg,
    ClTrid,
}

impl Envelope {
    /// Extract the envelope fields from a raw payload.
    ///
    /// Only the first EPP-namespaced `result` element (and the first `msg`
    /// beneath it) and the first `clTRID` are considered. Elements bound to
    /// foreign namespaces are skipped; unqualified elements are accepted for
    /// tolerance of sloppy peers.
    pub fn parse(payload: &[u8]) -> Self {
        let mut reader = NsReader::from_reader(payload);

        let mut envelope = Self::default();
        let mut entered_result = false;
        let mut in_result = false;
        let mut capture = Capture::None;
        let mut text = String::new();

        loop {
            match reader.read_resolved_event() {
                Ok((ns, Event::Start(e))) => {
                    if !in_epp_namespace(&ns) {
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"result" if !entered_result => {
                            entered_result = true;
                            in_result = true;
                            envelope.result_code = result_code_attr(&e);
                        }
                        b"msg" if in_result && envelope.result_message.is_none() => {
                            capture = Capture::Msg;
                            text.clear();
                        }
                        b"clTRID" if envelope.client_transaction_id.is_none() => {
                            capture = Capture::ClTrid;
                            text.clear();
                        }
                        _ => {}
                    }
                }
                Ok((ns, Event::Empty(e))) => {
                    if !in_epp_namespace(&ns) {
                        continue;
                    }
                    if e.local_name().as_ref() == b"result" && !entered_result {
                        entered_result = true;
                        envelope.result_code = result_code_attr(&e);
                    }
                }
                Ok((_, Event::Text(t))) => {
                    if capture != Capture::None {
                        if let Ok(chunk) = t.unescape() {
                            text.push_str(&chunk);
                        }
                    }
                }
                Ok((_, Event::CData(t))) => {
                    if capture != Capture::None {
                        text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Ok((_, Event::End(e))) => {
                    match e.local_name().as_ref() {
                        b"msg" if capture == Capture::Msg => {
                            if !text.is_empty() {
                                envelope.result_message = Some(std::mem::take(&mut text));
                            }
                            capture = Capture::None;
                        }
                        b"clTRID" if capture == Capture::ClTrid => {
                            if !text.is_empty() {
                                envelope.client_transaction_id = Some(std::mem::take(&mut text));
                            }
                            capture = Capture::None;
                        }
                        b"result" => in_result = false,
                        _ => {}
                    }

                    if envelope.result_code.is_some()
                        && envelope.result_message.is_some()
                        && envelope.client_transaction_id.is_some()
                    {
                        break;
                    }
                }
                Ok((_, Event::Eof)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        envelope
    }

    /// The `code` attribute of the first `result` element, or `2400` when
    /// the element or attribute is absent or unreadable.
    pub fn result_code(&self) -> u16 {
        self.result_code.unwrap_or(RESULT_COMMAND_FAILED)
    }

    /// The text of the first `result/msg`, or `"Unknown message"` when
    /// absent or empty.
    pub fn result_message(&self) -> &str {
        self.result_message.as_deref().unwrap_or(UNKNOWN_MESSAGE)
    }

    /// The text of the first `clTRID` element, if any.
    pub fn client_transaction_id(&self) -> Option<&str> {
        self.client_transaction_id.as_deref()
    }
}

/// Collect every `objURI` text from a greeting's service menu.
pub fn service_uris(greeting: &[u8]) -> Vec<String> {
    let mut reader = NsReader::from_reader(greeting);

    let mut uris = Vec::new();
    let mut capturing = false;
    let mut text = String::new();

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(e))) => {
                if in_epp_namespace(&ns) && e.local_name().as_ref() == b"objURI" {
                    capturing = true;
                    text.clear();
                }
            }
            Ok((_, Event::Text(t))) => {
                if capturing {
                    if let Ok(chunk) = t.unescape() {
                        text.push_str(&chunk);
                    }
                }
            }
            Ok((_, Event::End(e))) => {
                if capturing && e.local_name().as_ref() == b"objURI" {
                    if !text.is_empty() {
                        uris.push(std::mem::take(&mut text));
                    }
                    capturing = false;
                }
            }
            Ok((_, Event::Eof)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    uris
}

fn in_epp_namespace(ns: &ResolveResult) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(ns)) => *ns == EPP_NS.as_bytes(),
        ResolveResult::Unbound => true,
        // Undeclared prefix: malformed, but stay tolerant.
        ResolveResult::Unknown(_) => true,
    }
}

fn result_code_attr(e: &quick_xml::events::BytesStart<'_>) -> Option<u16> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"code" {
            return String::from_utf8_lossy(&attr.value).trim().parse().ok();
        }
    }
    None
}
