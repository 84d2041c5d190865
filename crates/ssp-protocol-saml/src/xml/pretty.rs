//! Indented rendering of raw SAML messages for the debug view.

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

/// Re-indents `xml` with two spaces per level.
///
/// Display only: the output is never fed back into validation. Input that
/// quick-xml cannot tokenize is returned unchanged.
#[must_use]
pub fn pretty_print(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => {}
            Ok(event) => {
                if writer.write_event(event).is_err() {
                    return xml.to_string();
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "message is not well-formed, showing it unformatted");
                return xml.to_string();
            }
        }
    }

    String::from_utf8(writer.into_inner()).unwrap_or_else(|_| xml.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_nested_elements() {
        let out = pretty_print("<a><b>text</b><c/></a>");
        assert!(out.starts_with("<a>"));
        assert!(out.contains("\n  <b>text</b>"));
        assert!(out.trim_end().ends_with("</a>"));
    }

    #[test]
    fn malformed_input_is_returned_verbatim() {
        let input = "<a><b></a>";
        assert_eq!(pretty_print(input), input);
    }
}
