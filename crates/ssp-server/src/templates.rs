//! HTML pages.

use askama::Template;

/// One attribute row on the profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    /// Attribute name.
    pub name: String,
    /// Attribute values in document order.
    pub values: Vec<String>,
}

/// Home page.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    /// Whether a session exists.
    pub authenticated: bool,
    /// NameID of the logged in user.
    pub name_id: Option<&'a str>,
    /// SP entity ID.
    pub sp_entity_id: &'a str,
    /// SP ACS URL.
    pub acs_url: &'a str,
    /// SP metadata URL.
    pub metadata_url: &'a str,
    /// IdP entity ID.
    pub idp_entity_id: &'a str,
    /// IdP SSO URL for the Redirect binding.
    pub idp_sso_url: &'a str,
    /// Whether the debug page is available.
    pub debug: bool,
}

/// Profile page.
#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate<'a> {
    /// NameID.
    pub name_id: &'a str,
    /// NameID format.
    pub name_id_format: Option<&'a str>,
    /// IdP session index.
    pub session_index: Option<&'a str>,
    /// IdP entity ID.
    pub issuer: &'a str,
    /// Login time, RFC 3339.
    pub login_time: String,
    /// Released attributes.
    pub attributes: Vec<AttributeRow>,
    /// Whether the debug page is available.
    pub debug: bool,
}

/// Raw SAML response page.
#[derive(Template)]
#[template(path = "debug.html")]
pub struct DebugTemplate<'a> {
    /// NameID.
    pub name_id: &'a str,
    /// Login time, RFC 3339.
    pub login_time: String,
    /// Base64 SAMLResponse as posted.
    pub raw_response: &'a str,
    /// Decoded and indented XML.
    pub decoded_response: String,
}

/// Error page.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    /// Page title.
    pub title: &'a str,
    /// Error kind.
    pub kind: &'a str,
    /// Error message.
    pub message: &'a str,
    /// Operator remediation.
    pub remediation: Option<&'a str>,
    /// Debug detail.
    pub detail: Option<&'a str>,
}
