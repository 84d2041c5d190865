//! HTTP-POST Binding implementation.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::xml::escape;

use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Base64-encodes a message for the `SAMLRequest`/`SAMLResponse` field.
    #[must_use]
    pub fn encode(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Builds an HTML page that posts an already encoded message to
    /// `destination` as soon as it loads.
    #[must_use]
    pub fn auto_submit_form(
        destination: &str,
        message_type: SamlMessageType,
        encoded: &str,
        relay_state: Option<&str>,
    ) -> String {
        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            escape(destination),
            message_type.form_param(),
            encoded,
            relay_state_input
        )
    }

    /// Decodes a base64 form field.
    ///
    /// Line breaks and other whitespace are ignored since some identity
    /// providers wrap the encoded value at 64 or 76 columns.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Decoding`] on invalid base64 or non UTF-8 content.
    pub fn decode(
        encoded: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.is_empty() {
            return Err(SamlError::Decoding(format!(
                "empty {} parameter",
                message_type.form_param()
            )));
        }

        let decoded = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::Decoding(format!("message is not UTF-8: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: None,
            sig_alg: None,
            signed_content: None,
        })
    }
}
