//! End-to-end tests of the HTTP surface against an in-process IdP.

use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Utc};
use ssp_protocol_saml::bindings::{HttpPostBinding, HttpRedirectBinding};
use ssp_protocol_saml::signature::XmlSigner;
use ssp_protocol_saml::{format_instant, parse_metadata, EntityDescriptor, SigningCredentials};
use ssp_server::config::FileConfig;
use ssp_server::{create_router, AppState, ServerConfig};
use tower::ServiceExt;

const IDP_ENTITY_ID: &str = "http://localhost:8080/realms/myrealm";
const IDP_SSO_URL: &str = "http://localhost:8080/realms/myrealm/protocol/saml";
const SP_ENTITY_ID: &str = "http://localhost:3000/metadata";
const ACS_URL: &str = "http://localhost:3000/acs";

struct TestApp {
    router: Router,
    state: AppState,
    idp: SigningCredentials,
}

fn app(env: &[(&str, &str)]) -> TestApp {
    let config = ServerConfig::from_sources(FileConfig::default(), |name| {
        env.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| (*value).to_string())
    })
    .unwrap();
    let idp = SigningCredentials::generate().unwrap();
    let descriptor =
        EntityDescriptor::manual_idp(IDP_ENTITY_ID, IDP_SSO_URL, idp.certificate().clone());
    let state = AppState::new(config, SigningCredentials::generate().unwrap(), descriptor);
    TestApp {
        router: create_router(state.clone()),
        state,
        idp,
    }
}

/// A signed Response for `user@example.com` answering `request_id`.
fn signed_response(idp: &SigningCredentials, request_id: &str) -> String {
    let now = Utc::now();
    let issued = format_instant(&now);
    let not_before = format_instant(&(now - Duration::minutes(1)));
    let not_on_or_after = format_instant(&(now + Duration::minutes(5)));
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp-router" Version="2.0" IssueInstant="{issued}" Destination="{ACS_URL}" InResponseTo="{request_id}">
  <saml:Issuer>{IDP_ENTITY_ID}</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_assert-router" Version="2.0" IssueInstant="{issued}">
    <saml:Issuer>{IDP_ENTITY_ID}</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">user@example.com</saml:NameID>
      <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
        <saml:SubjectConfirmationData NotOnOrAfter="{not_on_or_after}" Recipient="{ACS_URL}" InResponseTo="{request_id}"/>
      </saml:SubjectConfirmation>
    </saml:Subject>
    <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">
      <saml:AudienceRestriction><saml:Audience>{SP_ENTITY_ID}</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{issued}" SessionIndex="_session-router"/>
    <saml:AttributeStatement>
      <saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue></saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#
    );
    let signed = XmlSigner::new(idp.signing_key())
        .with_certificate(idp.certificate())
        .sign_enveloped(&xml, "_assert-router")
        .unwrap();
    HttpPostBinding::encode(&signed)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn post_acs(saml_response: &str) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("SAMLResponse", saml_response)
        .append_pair("RelayState", "/profile")
        .finish();
    Request::builder()
        .method("POST")
        .uri("/acs")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Follows `/login` and returns the AuthnRequest ID it sent.
async fn login(app: &TestApp) -> String {
    let response = app.router.clone().oneshot(get("/login")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with(IDP_SSO_URL));

    let message = HttpRedirectBinding::decode_url(&location).unwrap();
    let start = message.xml.find(" ID=\"").unwrap() + 5;
    let end = start + message.xml[start..].find('"').unwrap();
    message.xml[start..end].to_string()
}

/// Posts a valid Response for a fresh login and returns the session cookie.
async fn complete_login(app: &TestApp) -> String {
    let request_id = login(app).await;
    let response = app
        .router
        .clone()
        .oneshot(post_acs(&signed_response(&app.idp, &request_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/profile");

    let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("HttpOnly"));
    cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(&[]);
    let response = app.router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn metadata_is_served_as_xml() {
    let app = app(&[]);
    let response = app.router.oneshot(get("/metadata")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/xml");

    let descriptor = parse_metadata(&body_text(response).await).unwrap();
    assert_eq!(descriptor.entity_id, SP_ENTITY_ID);
    assert_eq!(descriptor.acs_endpoints[0].location, ACS_URL);
    assert_eq!(descriptor.signing_certificates.len(), 1);
}

#[tokio::test]
async fn login_redirects_to_idp_and_records_request() {
    let app = app(&[]);
    let request_id = login(&app).await;

    assert!(request_id.starts_with('_'));
    assert_eq!(app.state.pending.as_ref().unwrap().len(), 1);
}

#[tokio::test]
async fn acs_creates_session_shown_on_profile() {
    let app = app(&[]);
    let cookie = complete_login(&app).await;
    assert_eq!(app.state.sessions.len(), 1);

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/profile", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("user@example.com"));
    assert!(page.contains("role"));
    assert!(page.contains("admin"));
    assert!(page.contains("_session-router"));
}

#[tokio::test]
async fn replayed_response_is_rejected() {
    let app = app(&[]);
    let request_id = login(&app).await;
    let encoded = signed_response(&app.idp, &request_id);

    let first = app.router.clone().oneshot(post_acs(&encoded)).await.unwrap();
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let second = app.router.clone().oneshot(post_acs(&encoded)).await.unwrap();
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(second).await.contains("unsolicited_response"));
}

#[tokio::test]
async fn response_signed_by_another_idp_is_rejected() {
    let app = app(&[]);
    let request_id = login(&app).await;
    let stranger = SigningCredentials::generate().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_acs(&signed_response(&stranger, &request_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SET_COOKIE).is_none());
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn garbage_response_is_a_bad_request() {
    let app = app(&[]);
    let response = app.router.oneshot(post_acs("%%%not-base64")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn error_detail_only_shown_in_debug_mode() {
    let rejected = HttpPostBinding::encode(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_detail-marker" Version="2.0" IssueInstant="2024-06-01T12:00:00Z"><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Requester"/></samlp:Status></samlp:Response>"#,
    );

    let quiet = app(&[]);
    let response = quiet.router.oneshot(post_acs(&rejected)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let page = body_text(response).await;
    assert!(page.contains("assertion_rejected"));
    assert!(!page.contains("_detail-marker"));

    let debug = app(&[("DEBUG", "true")]);
    let response = debug.router.oneshot(post_acs(&rejected)).await.unwrap();
    assert!(body_text(response).await.contains("_detail-marker"));
}

#[tokio::test]
async fn profile_without_session_redirects_home() {
    let app = app(&[]);
    let response = app.router.oneshot(get("/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/");
}

#[tokio::test]
async fn logout_clears_session() {
    let app = app(&[]);
    let cookie = complete_login(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/logout", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers()[SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));
    assert!(app.state.sessions.is_empty());

    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/profile", &cookie))
        .await
        .unwrap();
    assert_eq!(response.headers()[LOCATION], "/");
}

#[tokio::test]
async fn debug_page_is_hidden_unless_enabled() {
    let app = app(&[]);
    let cookie = complete_login(&app).await;
    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/debug", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_page_shows_decoded_response() {
    let app = app(&[("DEBUG", "1")]);
    let cookie = complete_login(&app).await;
    let response = app
        .router
        .clone()
        .oneshot(get_with_cookie("/debug", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("_assert-router"));
    assert!(page.contains("user@example.com"));
}

#[tokio::test]
async fn home_links_to_login_when_anonymous() {
    let app = app(&[]);
    let response = app.router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("/login"));
    assert!(page.contains(IDP_ENTITY_ID));
}
