use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Device, Mode, Variant};

/// Shown when a reward plug is asked to switch on before the chores are done.
pub const BLOCKED_WARNING: &str = "No TV: not every task is done.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    On,
    Off,
    /// Decide on/off from the device mode and today's completion.
    Logical,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Logical => "logical",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            "logical" => Ok(Action::Logical),
            other => Err(anyhow!("invalid action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Send(Action),
    Blocked,
}

/// Turns a logical action into a concrete one.
///
/// | mode       | tasks done | result  |
/// |------------|------------|---------|
/// | reward     | no         | blocked |
/// | reward     | yes        | on      |
/// | punishment | no         | off     |
/// | punishment | yes        | on      |
pub fn resolve_logical(mode: Mode, all_done: bool) -> Resolution {
    match (mode, all_done) {
        (Mode::Reward, false) => Resolution::Blocked,
        (Mode::Reward, true) => Resolution::Send(Action::On),
        (Mode::Punishment, false) => Resolution::Send(Action::Off),
        (Mode::Punishment, true) => Resolution::Send(Action::On),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound HTTP call. A body is always JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes a [`CommandRequest`]. Errors are transport failures only; any
/// HTTP status comes back as a reply.
pub trait Transport {
    fn execute(
        &self,
        request: &CommandRequest,
    ) -> impl Future<Output = anyhow::Result<HttpReply>> + Send;
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(
        "device `{device}` has no deviceName; \
         complete it from the config page (e.g. living_room_plug)"
    )]
    MissingDeviceName { device: String },

    #[error("local plugs only accept on/off, got {0}")]
    UnsupportedAction(Action),

    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request failed: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Sent { action: Action, response: Value },
    Blocked { warning: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Sends plug commands for one deployment variant.
#[derive(Debug)]
pub struct CommandSender<T> {
    variant: Variant,
    api_base: String,
    transport: T,
}

impl<T: Transport> CommandSender<T> {
    pub fn new(variant: Variant, api_base: impl Into<String>, transport: T) -> Self {
        Self {
            variant,
            api_base: api_base.into(),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds the wire request for a concrete action.
    pub fn build_request(
        &self,
        device: &Device,
        action: Action,
    ) -> Result<CommandRequest, CommandError> {
        match self.variant {
            Variant::Local => local_request(device, action),
            Variant::Cloud => cloud_request(&self.api_base, device, action),
        }
    }

    /// Handles a button press: `on`/`off` are sent as-is, `logical` is
    /// resolved first and may be blocked without any request.
    #[tracing::instrument(
        skip(self, device),
        fields(device = %device.id, variant = self.variant.as_str())
    )]
    pub async fn trigger(
        &self,
        device: &Device,
        action: Action,
        all_done: bool,
    ) -> Result<Outcome, CommandError> {
        if action != Action::Logical {
            return self.send(device, action).await;
        }

        match resolve_logical(device.mode, all_done) {
            Resolution::Send(resolved) => {
                debug!(
                    mode = %device.mode,
                    all_done,
                    resolved = %resolved,
                    "resolved logical action"
                );
                self.send(device, resolved).await
            }
            Resolution::Blocked => {
                info!(mode = %device.mode, "logical action blocked; tasks incomplete");
                Ok(Outcome::Blocked {
                    warning: BLOCKED_WARNING.to_string(),
                })
            }
        }
    }

    /// Sends one action with no resolution step.
    #[tracing::instrument(skip(self, device), fields(device = %device.id))]
    pub async fn send(&self, device: &Device, action: Action) -> Result<Outcome, CommandError> {
        let request = self.build_request(device, action)?;
        debug!(url = %request.url, method = ?request.method, "sending command");

        let reply = self.transport.execute(&request).await.map_err(|err| {
            warn!(url = %request.url, error = %err, "command transport failed");
            CommandError::Transport(format!("{err:#}"))
        })?;

        if !reply.is_success() {
            let message = error_message(&reply);
            warn!(status = reply.status, message = %message, "command rejected");
            return Err(CommandError::Status {
                status: reply.status,
                message,
            });
        }

        let response = serde_json::from_str(&reply.body).unwrap_or_else(|_| json!({}));
        info!(action = %action, status = reply.status, "command sent");
        Ok(Outcome::Sent { action, response })
    }
}

fn local_request(device: &Device, action: Action) -> Result<CommandRequest, CommandError> {
    let power = match action {
        Action::On => "On",
        Action::Off => "Off",
        Action::Logical => return Err(CommandError::UnsupportedAction(action)),
    };

    Ok(CommandRequest {
        method: Method::Get,
        url: format!(
            "http://{}/cm?cmnd=Power%20{power}",
            device.target(Variant::Local)
        ),
        body: None,
    })
}

fn cloud_request(
    api_base: &str,
    device: &Device,
    action: Action,
) -> Result<CommandRequest, CommandError> {
    let device_name = device.target(Variant::Cloud);
    if device_name.is_empty() {
        return Err(CommandError::MissingDeviceName {
            device: device.name.clone(),
        });
    }

    let invalid = |reason: &str| CommandError::InvalidEndpoint {
        url: api_base.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(api_base).map_err(|err| invalid(&err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL"))?
        .pop_if_empty()
        .extend(["api", "devices", device_name, "command"]);

    Ok(CommandRequest {
        method: Method::Post,
        url: url.to_string(),
        body: Some(json!({ "action": action.as_str() }).to_string()),
    })
}

/// The body's non-empty `error` string, else `HTTP <status>`.
fn error_message(reply: &HttpReply) -> String {
    serde_json::from_str::<ErrorBody>(&reply.body)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", reply.status))
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// No timeout unless one is given; the transport default applies.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed building HTTP client for plug commands")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: &CommandRequest) -> anyhow::Result<HttpReply> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.as_str()),
            Method::Post => self.client.post(request.url.as_str()),
        };
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("failed requesting {}", request.url))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body from {}", request.url))?;

        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recording {
        reply: Result<HttpReply, String>,
        seen: Mutex<Vec<CommandRequest>>,
    }

    impl Recording {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                reply: Ok(HttpReply {
                    status,
                    body: body.to_string(),
                }),
                seen: Mutex::new(vec![]),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(vec![]),
            }
        }

        fn seen(&self) -> Vec<CommandRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Recording {
        async fn execute(&self, request: &CommandRequest) -> anyhow::Result<HttpReply> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(|msg| anyhow!(msg))
        }
    }

    fn cloud_device(name: &str, mode: Mode) -> Device {
        let mut device = Device::new("1", "TV", mode);
        device.device_name = Some(name.to_string());
        device
    }

    fn cloud(transport: Recording) -> CommandSender<Recording> {
        CommandSender::new(Variant::Cloud, "https://relay.example", transport)
    }

    fn sent_actions(sender: &CommandSender<Recording>) -> Vec<String> {
        sender
            .transport()
            .seen()
            .into_iter()
            .filter_map(|req| req.body)
            .map(|body| serde_json::from_str::<Value>(&body).unwrap()["action"].to_string())
            .collect()
    }

    #[test]
    fn logical_resolution_table() {
        assert_eq!(resolve_logical(Mode::Reward, false), Resolution::Blocked);
        assert_eq!(resolve_logical(Mode::Reward, true), Resolution::Send(Action::On));
        assert_eq!(resolve_logical(Mode::Punishment, false), Resolution::Send(Action::Off));
        assert_eq!(resolve_logical(Mode::Punishment, true), Resolution::Send(Action::On));
    }

    #[test]
    fn local_request_targets_power_endpoint() {
        let sender = CommandSender::new(Variant::Local, "", Recording::replying(200, ""));
        let mut device = Device::new("1", "TV", Mode::Reward);
        device.ip = Some("192.168.1.50".to_string());

        let on = sender.build_request(&device, Action::On).unwrap();
        assert_eq!(on.method, Method::Get);
        assert_eq!(on.url, "http://192.168.1.50/cm?cmnd=Power%20On");
        assert_eq!(on.body, None);

        let off = sender.build_request(&device, Action::Off).unwrap();
        assert_eq!(off.url, "http://192.168.1.50/cm?cmnd=Power%20Off");

        assert!(matches!(
            sender.build_request(&device, Action::Logical),
            Err(CommandError::UnsupportedAction(Action::Logical))
        ));
    }

    #[test]
    fn cloud_request_encodes_device_name_segment() {
        let sender = CommandSender::new(
            Variant::Cloud,
            "https://relay.example/v2/",
            Recording::replying(200, "{}"),
        );
        let request = sender
            .build_request(&cloud_device("living room", Mode::Reward), Action::Off)
            .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://relay.example/v2/api/devices/living%20room/command");
        assert_eq!(request.body.as_deref(), Some(r#"{"action":"off"}"#));
    }

    #[tokio::test]
    async fn reward_logical_blocked_until_all_done() {
        let sender = cloud(Recording::replying(200, r#"{"ok":true}"#));
        let device = cloud_device("tv_plug", Mode::Reward);

        let blocked = sender.trigger(&device, Action::Logical, false).await.unwrap();
        assert_eq!(
            blocked,
            Outcome::Blocked {
                warning: BLOCKED_WARNING.to_string()
            }
        );
        assert!(sender.transport().seen().is_empty());

        let sent = sender.trigger(&device, Action::Logical, true).await.unwrap();
        assert_eq!(
            sent,
            Outcome::Sent {
                action: Action::On,
                response: json!({"ok": true})
            }
        );
        assert_eq!(sent_actions(&sender), vec!["\"on\""]);
    }

    #[tokio::test]
    async fn punishment_logical_sends_off_then_on() {
        let sender = cloud(Recording::replying(200, "{}"));
        let device = cloud_device("tv_plug", Mode::Punishment);

        sender.trigger(&device, Action::Logical, false).await.unwrap();
        sender.trigger(&device, Action::Logical, true).await.unwrap();

        assert_eq!(sent_actions(&sender), vec!["\"off\"", "\"on\""]);
    }

    #[tokio::test]
    async fn force_actions_bypass_resolution() {
        let sender = cloud(Recording::replying(204, ""));
        let device = cloud_device("tv_plug", Mode::Reward);

        let outcome = sender.trigger(&device, Action::On, false).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Sent {
                action: Action::On,
                response: json!({})
            }
        );
        assert_eq!(sent_actions(&sender), vec!["\"on\""]);
    }

    #[tokio::test]
    async fn empty_device_name_never_hits_the_wire() {
        let sender = cloud(Recording::replying(200, "{}"));
        let device = cloud_device("", Mode::Punishment);

        let err = sender.trigger(&device, Action::Off, false).await.unwrap_err();
        assert!(matches!(err, CommandError::MissingDeviceName { .. }));
        assert!(sender.transport().seen().is_empty());
    }

    #[tokio::test]
    async fn non_success_uses_backend_error_field() {
        let sender = cloud(Recording::replying(404, r#"{"error":"unknown device"}"#));
        let err = sender
            .send(&cloud_device("tv_plug", Mode::Reward), Action::On)
            .await
            .unwrap_err();

        match err {
            CommandError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "unknown device");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_without_json_falls_back_to_status() {
        let sender = cloud(Recording::replying(502, "<html>bad gateway</html>"));
        let err = sender
            .send(&cloud_device("tv_plug", Mode::Reward), Action::On)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed: HTTP 502");
    }

    #[tokio::test]
    async fn empty_error_field_falls_back_to_status() {
        let sender = cloud(Recording::replying(500, r#"{"error":""}"#));
        let err = sender
            .send(&cloud_device("tv_plug", Mode::Reward), Action::On)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed: HTTP 500");
    }

    #[tokio::test]
    async fn local_logical_resolves_to_power_on_get() {
        let sender = CommandSender::new(Variant::Local, "", Recording::replying(200, ""));
        let mut device = Device::new("1", "TV", Mode::Reward);
        device.ip = Some("192.168.1.50".to_string());

        let outcome = sender.trigger(&device, Action::Logical, true).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Sent {
                action: Action::On,
                response: json!({})
            }
        );

        let seen = sender.transport().seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Get);
        assert_eq!(seen[0].url, "http://192.168.1.50/cm?cmnd=Power%20On");
        assert_eq!(seen[0].body, None);
    }

    #[tokio::test]
    async fn local_transport_failure_is_reported() {
        let sender =
            CommandSender::new(Variant::Local, "", Recording::failing("connection refused"));
        let device = Device::new("1", "TV", Mode::Reward);

        let err = sender.send(&device, Action::Off).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Transport(ref msg) if msg.contains("connection refused")
        ));
        assert_eq!(sender.transport().seen()[0].url, "http:///cm?cmnd=Power%20Off");
    }
}
