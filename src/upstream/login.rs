//! Login command construction (RFC 5730 §2.9.1.1).

use quick_xml::escape::escape;

use crate::core::constants::{EPP_LANG, EPP_NS, EPP_VERSION};

/// Build a login command payload.
///
/// Declares the given object-service URIs; when the slice is empty the
/// `<svcs>` element is omitted entirely.
pub fn build_login(
    client_id: &str,
    password: &str,
    service_uris: &[String],
    cl_trid: &str,
) -> Vec<u8> {
    let mut doc = String::with_capacity(512);
    doc.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.push_str(&format!(r#"<epp xmlns="{EPP_NS}"><command><login>"#));
    doc.push_str(&format!("<clID>{}</clID>", escape(client_id)));
    doc.push_str(&format!("<pw>{}</pw>", escape(password)));
    doc.push_str(&format!(
        "<options><version>{EPP_VERSION}</version><lang>{EPP_LANG}</lang></options>"
    ));
    if !service_uris.is_empty() {
        doc.push_str("<svcs>");
        for uri in service_uris {
            doc.push_str(&format!("<objURI>{}</objURI>", escape(uri)));
        }
        doc.push_str("</svcs>");
    }
    doc.push_str("</login>");
    doc.push_str(&format!("<clTRID>{}</clTRID>", escape(cl_trid)));
    doc.push_str("</command></epp>");
    doc.into_bytes()
}
