//! School platform adapter (reqwest).
//!
//! - Keycloak password grant for authentication
//! - REST campus list
//! - GraphQL `getUserNotifications` for the notification feed

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use s21n_core::{
    config::Config,
    domain::{Campus, Credentials, NotificationEvent, NotificationId},
    errors::Error,
    ports::{AuthToken, PlatformApi},
    Result,
};

const CLIENT_ID: &str = "s21-open-api";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; SchoolNotifier/1.0)";
const CAMPUSES_PATH: &str = "/services/21-school/api/v1/campuses";
const GRAPHQL_PATH: &str = "/services/graphql";

const NOTIFICATIONS_QUERY: &str = "query getUserNotifications($paging: PagingInput!) {
  s21Notification {
    getS21Notifications(paging: $paging) {
      notifications {
        id
        relatedObjectType
        relatedObjectId
        message
        time
        wasRead
        groupName
      }
      totalCount
    }
  }
}";

#[derive(Clone, Debug)]
pub struct PlatformClient {
    http: reqwest::Client,
    auth_url: String,
    api_url: String,
}

impl PlatformClient {
    pub fn new(
        auth_url: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            auth_url: auth_url.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.platform_auth_url.clone(),
            cfg.platform_api_url.clone(),
            cfg.http_timeout,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken> {
        let form = [
            ("client_id", CLIENT_ID),
            ("username", credentials.login.as_str()),
            ("password", credentials.password.as_str()),
            ("grant_type", "password"),
        ];

        let resp = self
            .http
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| request_error("auth", e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(auth_status_error(status, &body));
        }
        parse_token_response(&body)
    }

    async fn list_campuses(&self, token: &str) -> Result<Vec<Campus>> {
        let resp = self
            .http
            .get(self.url(CAMPUSES_PATH))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| request_error("campuses", e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(data_status_error("campuses", status, &body));
        }
        let campuses = parse_campuses(&body)?;
        tracing::info!(count = campuses.len(), "fetched campus list");
        Ok(campuses)
    }

    async fn list_notifications(
        &self,
        token: &str,
        campus: &Campus,
        limit: u32,
    ) -> Result<Vec<NotificationEvent>> {
        let payload = json!({
            "operationName": "getUserNotifications",
            "variables": { "paging": { "offset": 0, "limit": limit } },
            "query": NOTIFICATIONS_QUERY,
        });

        let resp = self
            .http
            .post(self.url(GRAPHQL_PATH))
            .bearer_auth(token)
            .header("userrole", "STUDENT")
            .header("schoolid", campus.id.as_str())
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error("notifications", e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(data_status_error("notifications", status, &body));
        }
        parse_notifications(&body)
    }
}

// ============== Error classification ==============

fn request_error(what: &str, e: reqwest::Error) -> Error {
    Error::Transient(format!("{what} request failed: {e}"))
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Status of the token endpoint. Only 400/401 mean the credentials were rejected;
/// a 403 is retried like any other outage.
fn auth_status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            let reason = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| {
                    v.get("error_description")
                        .or_else(|| v.get("error"))
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "invalid login or password".to_string());
            Error::Auth(reason)
        }
        _ => Error::Transient(format!("auth endpoint returned {status}: {}", snippet(body))),
    }
}

/// Status of a data endpoint. 401/403 mean the session is no longer accepted.
fn data_status_error(what: &str, status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthExpired,
        _ => Error::Transient(format!("{what} returned {status}: {}", snippet(body))),
    }
}

// ============== Response parsing ==============

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

fn parse_token_response(body: &str) -> Result<AuthToken> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::Transient(format!("auth response is not valid json: {e}")))?;
    let access_token = parsed
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Transient("auth response has no access_token".to_string()))?;
    Ok(AuthToken {
        access_token,
        expires_in: parsed
            .expires_in
            .filter(|s| *s > 0)
            .map(Duration::from_secs),
    })
}

#[derive(Deserialize)]
struct CampusesResponse {
    #[serde(default)]
    campuses: Vec<CampusDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampusDto {
    id: String,
    short_name: Option<String>,
    full_name: Option<String>,
}

fn parse_campuses(body: &str) -> Result<Vec<Campus>> {
    let parsed: CampusesResponse = serde_json::from_str(body)
        .map_err(|e| Error::Transient(format!("campus list is not valid json: {e}")))?;
    Ok(parsed
        .campuses
        .into_iter()
        .map(|c| {
            let name = c
                .full_name
                .or(c.short_name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| c.id.clone());
            Campus { id: c.id, name }
        })
        .collect())
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlData {
    s21_notification: Option<NotificationRoot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRoot {
    get_s21_notifications: Option<NotificationPage>,
}

#[derive(Deserialize)]
struct NotificationPage {
    #[serde(default)]
    notifications: Vec<NotificationDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationDto {
    id: serde_json::Value,
    message: Option<String>,
    time: Option<String>,
    group_name: Option<String>,
    related_object_type: Option<String>,
    was_read: Option<bool>,
}

fn parse_notifications(body: &str) -> Result<Vec<NotificationEvent>> {
    let parsed: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| Error::Transient(format!("notifications are not valid json: {e}")))?;

    if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
        let joined = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let lower = joined.to_lowercase();
        if lower.contains("unauthorized") || lower.contains("401") {
            return Err(Error::AuthExpired);
        }
        return Err(Error::Transient(format!("graphql errors: {joined}")));
    }

    let notifications = parsed
        .data
        .and_then(|d| d.s21_notification)
        .and_then(|n| n.get_s21_notifications)
        .map(|p| p.notifications)
        .unwrap_or_default();

    Ok(notifications
        .into_iter()
        .filter_map(|n| {
            let id = match n.id {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(num) => num.to_string(),
                _ => return None,
            };
            Some(NotificationEvent {
                id: NotificationId(id),
                message: n.message.unwrap_or_default(),
                time: n.time.unwrap_or_default(),
                group_name: n.group_name,
                related_object_type: n.related_object_type,
                was_read: n.was_read.unwrap_or(false),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_with_and_without_expiry() {
        let t = parse_token_response(r#"{"access_token":"abc","expires_in":36000}"#).unwrap();
        assert_eq!(t.access_token, "abc");
        assert_eq!(t.expires_in, Some(Duration::from_secs(36000)));

        let t = parse_token_response(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(t.expires_in, None);

        let err = parse_token_response(r#"{"token_type":"bearer"}"#).unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }

    #[test]
    fn rejected_credentials_are_auth_errors() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid user credentials"}"#;
        match auth_status_error(StatusCode::UNAUTHORIZED, body) {
            Error::Auth(reason) => assert_eq!(reason, "Invalid user credentials"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(auth_status_error(StatusCode::BAD_REQUEST, "").is_fatal());
        assert!(matches!(
            auth_status_error(StatusCode::BAD_GATEWAY, "<html>"),
            Error::Transient(_)
        ));
        assert!(matches!(
            auth_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            Error::Transient(_)
        ));
    }

    #[test]
    fn forbidden_login_is_retried_not_fatal() {
        let err = auth_status_error(StatusCode::FORBIDDEN, "<html>Access denied</html>");
        assert!(matches!(err, Error::Transient(_)));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn data_endpoints_map_401_to_expired_session() {
        assert!(matches!(
            data_status_error("notifications", StatusCode::UNAUTHORIZED, ""),
            Error::AuthExpired
        ));
        assert!(matches!(
            data_status_error("notifications", StatusCode::SERVICE_UNAVAILABLE, ""),
            Error::Transient(_)
        ));
    }

    #[test]
    fn parses_campus_list() {
        let body = r#"{"campuses":[
            {"id":"6bfe3c56-0211-4fe1-9e59-51616caac4dd","shortName":"21 Moscow","fullName":"21 School Moscow"},
            {"id":"46e7d965","shortName":"21 Kazan"},
            {"id":"x1"}
        ]}"#;
        let campuses = parse_campuses(body).unwrap();
        assert_eq!(campuses.len(), 3);
        assert_eq!(campuses[0].name, "21 School Moscow");
        assert_eq!(campuses[1].name, "21 Kazan");
        assert_eq!(campuses[2].name, "x1");
    }

    #[test]
    fn parses_notification_feed() {
        let body = r#"{"data":{"s21Notification":{"getS21Notifications":{
            "notifications":[
              {"id":"n-1","relatedObjectType":"P2P","relatedObjectId":"9","message":"<p>Review at 18:00</p>",
               "time":"2026-03-01T15:00:00.000Z","wasRead":false,"groupName":"Reviews","__typename":"Notification"},
              {"id":42,"message":"Numeric id","time":"2026-03-01T16:00:00Z"},
              {"id":null,"message":"broken"}
            ],
            "totalCount":3}}}}"#;
        let events = parse_notifications(body).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.0, "n-1");
        assert_eq!(events[0].group_name.as_deref(), Some("Reviews"));
        assert_eq!(events[0].related_object_type.as_deref(), Some("P2P"));
        assert_eq!(events[1].id.0, "42");
        assert!(!events[1].was_read);
    }

    #[test]
    fn graphql_errors_are_classified() {
        let err = parse_notifications(r#"{"errors":[{"message":"Unauthorized"}]}"#).unwrap_err();
        assert!(matches!(err, Error::AuthExpired));

        let err = parse_notifications(r#"{"errors":[{"message":"Internal error"}],"data":null}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));

        assert!(parse_notifications(r#"{"data":{"s21Notification":null}}"#)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unreachable_platform_is_transient() {
        let client = PlatformClient::new(
            "http://127.0.0.1:9/token",
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client
            .authenticate(&Credentials::new("student", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }
}
