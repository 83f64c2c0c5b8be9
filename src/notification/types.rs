use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery channel discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Mail,
    Push,
}

impl ServiceType {
    pub const ALL: [ServiceType; 2] = [ServiceType::Mail, ServiceType::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Mail => "mail",
            ServiceType::Push => "push",
        }
    }

    /// Name of the template definition for this channel
    pub fn template_name(&self) -> &'static str {
        match self {
            ServiceType::Mail => "MAIL",
            ServiceType::Push => "PUSH",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mail" => Ok(ServiceType::Mail),
            "push" => Ok(ServiceType::Push),
            other => Err(format!("unknown service type: {}", other)),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A single addressee of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    pub language_id: String,
    /// Data exposed to templates under `user`
    #[serde(default = "empty_object")]
    pub payload: Value,
}

impl Recipient {
    /// Address of this recipient on the given channel, if any
    pub fn address(&self, service_type: ServiceType) -> Option<&str> {
        let address = match service_type {
            ServiceType::Mail => self.mail.as_deref(),
            ServiceType::Push => self.device_token.as_deref(),
        };
        address.filter(|a| !a.is_empty())
    }
}

/// Language specific data exposed to templates under `language`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePayload {
    pub language_id: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
    /// `base64` or absent for raw text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// SMTP envelope override
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// A rendered mail ready for a mail transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    pub from: String,
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
}

impl Mail {
    /// Read the recognised fields out of a rendered MAIL tree.
    pub(crate) fn from_rendered(rendered: &Value) -> Self {
        let envelope = rendered.get("envelope").and_then(|env| {
            let envelope = Envelope {
                from: non_blank_field(env, "from"),
                to: non_blank_field(env, "to"),
            };
            (envelope != Envelope::default()).then_some(envelope)
        });

        Self {
            from: string_field(rendered, "from").unwrap_or_default(),
            to: string_field(rendered, "to").unwrap_or_default(),
            subject: string_field(rendered, "subject").unwrap_or_default(),
            text: string_field(rendered, "text"),
            html: string_field(rendered, "html"),
            attachments: Vec::new(),
            envelope,
        }
    }
}

/// A rendered push message ready for a push transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpush: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apns: Option<Value>,
}

impl PushMessage {
    /// Read the recognised fields out of a rendered PUSH tree.
    pub(crate) fn from_rendered(rendered: &Value) -> Self {
        let section = |name: &str| rendered.get(name).cloned();
        Self {
            token: string_field(rendered, "token").unwrap_or_default(),
            data: section("data"),
            notification: section("notification"),
            android: section("android"),
            webpush: section("webpush"),
            apns: section("apns"),
        }
    }
}

/// A message addressed to exactly one channel
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Mail(Mail),
    Push(PushMessage),
}

impl OutboundMessage {
    pub fn service_type(&self) -> ServiceType {
        match self {
            OutboundMessage::Mail(_) => ServiceType::Mail,
            OutboundMessage::Push(_) => ServiceType::Push,
        }
    }
}

fn string_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Like `string_field`, but a blank value counts as absent
fn non_blank_field(value: &Value, name: &str) -> Option<String> {
    string_field(value, name).filter(|v| !v.trim().is_empty())
}
