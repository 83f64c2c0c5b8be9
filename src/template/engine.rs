//! Per-job templating engine.
//!
//! An engine holds the parsed MAIL and PUSH trees of one (platform, template)
//! pair and one render context per language of the job. Recipient data is
//! bound per render call and never stored.

use std::sync::Arc;

use serde_json::Value;

use crate::notification::{LanguagePayload, Mail, PushMessage, Recipient, ServiceType};

use super::loader::TemplateLoader;
use super::tree::{lookup, Scope, TemplateTree};
use super::types::{TemplateError, TemplateResult};

/// Raw channel definitions of one template
#[derive(Debug, Clone, Default)]
pub struct TemplateDefinitions {
    pub mail: Option<Value>,
    pub push: Option<Value>,
}

/// Language context: job-wide `message` data plus that language's payload
#[derive(Debug)]
struct RenderContext {
    language_id: String,
    message: Arc<Value>,
    language: Value,
}

/// View of one context with the current recipient bound as `user`
struct RenderScope<'a> {
    context: &'a RenderContext,
    user: &'a Value,
}

impl Scope for RenderScope<'_> {
    fn resolve(&self, path: &[String]) -> Option<&Value> {
        let (namespace, rest) = path.split_first()?;
        let root = match namespace.as_str() {
            "message" => self.context.message.as_ref(),
            "language" => &self.context.language,
            "user" => self.user,
            _ => return None,
        };
        lookup(root, rest)
    }
}

pub struct TemplatingEngine {
    platform_id: String,
    template_id: String,
    mail: Option<TemplateTree>,
    push: Option<TemplateTree>,
    contexts: Vec<RenderContext>,
}

impl TemplatingEngine {
    /// Load both channel definitions and build the engine.
    pub async fn load(
        loader: &dyn TemplateLoader,
        platform_id: &str,
        template_id: &str,
        base_payload: Value,
        language_payloads: Vec<LanguagePayload>,
    ) -> TemplateResult<Self> {
        let definitions = TemplateDefinitions {
            mail: loader.load(platform_id, template_id, ServiceType::Mail).await?,
            push: loader.load(platform_id, template_id, ServiceType::Push).await?,
        };

        Self::from_definitions(
            platform_id,
            template_id,
            definitions,
            base_payload,
            language_payloads,
        )
    }

    /// Build an engine from already loaded definitions.
    ///
    /// Fails with `NotFound` only when neither channel is defined; a single
    /// missing channel fails when it is rendered.
    pub fn from_definitions(
        platform_id: &str,
        template_id: &str,
        definitions: TemplateDefinitions,
        base_payload: Value,
        language_payloads: Vec<LanguagePayload>,
    ) -> TemplateResult<Self> {
        if definitions.mail.is_none() && definitions.push.is_none() {
            return Err(TemplateError::NotFound {
                platform_id: platform_id.to_string(),
                template_id: template_id.to_string(),
                channel: None,
            });
        }

        let mail = definitions
            .mail
            .as_ref()
            .map(|raw| parse_channel(ServiceType::Mail, raw))
            .transpose()?;
        let push = definitions
            .push
            .as_ref()
            .map(|raw| parse_channel(ServiceType::Push, raw))
            .transpose()?;

        let message = Arc::new(base_payload);
        let mut contexts: Vec<RenderContext> = Vec::with_capacity(language_payloads.len());
        for entry in language_payloads {
            if contexts.iter().any(|c| c.language_id == entry.language_id) {
                tracing::warn!(
                    platform_id = %platform_id,
                    template_id = %template_id,
                    language_id = %entry.language_id,
                    "Duplicate language payload ignored, first entry wins"
                );
                continue;
            }
            contexts.push(RenderContext {
                language_id: entry.language_id,
                message: message.clone(),
                language: entry.payload,
            });
        }

        Ok(Self {
            platform_id: platform_id.to_string(),
            template_id: template_id.to_string(),
            mail,
            push,
            contexts,
        })
    }

    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn has_channel(&self, service_type: ServiceType) -> bool {
        self.tree(service_type).is_some()
    }

    pub fn language_ids(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(|c| c.language_id.as_str())
    }

    /// Render the MAIL template for `user`; `to` is always the user's address.
    pub fn create_mail_message(&self, user: &Recipient) -> TemplateResult<Mail> {
        let address = user
            .address(ServiceType::Mail)
            .ok_or(TemplateError::MissingAddress(ServiceType::Mail))?;

        let rendered = self.render(ServiceType::Mail, user)?;
        let mut mail = Mail::from_rendered(&rendered);
        mail.to = address.to_string();
        Ok(mail)
    }

    /// Render the PUSH template for `user`; `token` is always `device`.
    pub fn create_push_message(&self, user: &Recipient, device: &str) -> TemplateResult<PushMessage> {
        let rendered = self.render(ServiceType::Push, user)?;
        let mut message = PushMessage::from_rendered(&rendered);
        message.token = device.to_string();
        Ok(message)
    }

    fn render(&self, service_type: ServiceType, user: &Recipient) -> TemplateResult<Value> {
        let tree = self.tree(service_type).ok_or_else(|| TemplateError::NotFound {
            platform_id: self.platform_id.clone(),
            template_id: self.template_id.clone(),
            channel: Some(service_type),
        })?;

        let context = self
            .contexts
            .iter()
            .find(|c| c.language_id == user.language_id)
            .ok_or_else(|| TemplateError::PayloadNotFound(user.language_id.clone()))?;

        Ok(tree.render(&RenderScope {
            context,
            user: &user.payload,
        }))
    }

    fn tree(&self, service_type: ServiceType) -> Option<&TemplateTree> {
        match service_type {
            ServiceType::Mail => self.mail.as_ref(),
            ServiceType::Push => self.push.as_ref(),
        }
    }
}

/// Parse one channel definition, prefixing syntax error paths with the channel name.
fn parse_channel(service_type: ServiceType, raw: &Value) -> TemplateResult<TemplateTree> {
    let name = service_type.template_name();
    let qualify = |path: &str| {
        if path == "(root)" {
            name.to_string()
        } else {
            format!("{}.{}", name, path)
        }
    };

    match TemplateTree::parse(raw) {
        Ok(tree @ TemplateTree::Node(_)) => Ok(tree),
        Ok(TemplateTree::Leaf(_)) => Err(TemplateError::Syntax {
            path: name.to_string(),
            reason: "template root must be an object".to_string(),
        }),
        Err(TemplateError::Syntax { path, reason }) => Err(TemplateError::Syntax {
            path: qualify(&path),
            reason,
        }),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MemoryTemplateLoader;
    use serde_json::json;

    fn recipient(language_id: &str, mail: Option<&str>, payload: Value) -> Recipient {
        Recipient {
            mail: mail.map(str::to_string),
            device_token: None,
            language_id: language_id.to_string(),
            payload,
        }
    }

    fn english() -> Vec<LanguagePayload> {
        vec![LanguagePayload {
            language_id: "en".to_string(),
            payload: json!({ "greeting": "Hello" }),
        }]
    }

    fn mail_only(definition: Value) -> TemplateDefinitions {
        TemplateDefinitions {
            mail: Some(definition),
            push: None,
        }
    }

    #[test]
    fn test_mail_message_scenario() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "Hi {{user.name}}" })),
            json!({}),
            vec![LanguagePayload {
                language_id: "en".to_string(),
                payload: json!({}),
            }],
        )
        .unwrap();

        let user = recipient("en", Some("a@b.com"), json!({ "name": "Ann" }));
        let mail = engine.create_mail_message(&user).unwrap();

        assert_eq!(mail.to, "a@b.com");
        assert_eq!(mail.subject, "Hi Ann");
    }

    #[test]
    fn test_to_is_overridden_with_recipient_address() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "to": "someone-else@example.com", "subject": "x" })),
            json!({}),
            english(),
        )
        .unwrap();

        let mail = engine
            .create_mail_message(&recipient("en", Some("ann@example.com"), json!({})))
            .unwrap();
        assert_eq!(mail.to, "ann@example.com");
    }

    #[test]
    fn test_namespaces_compose() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "order",
            mail_only(json!({
                "subject": "{{language.greeting}} {{user.name}}, order {{message.order.id}}"
            })),
            json!({ "order": { "id": "A-1" } }),
            english(),
        )
        .unwrap();

        let mail = engine
            .create_mail_message(&recipient("en", Some("a@b.com"), json!({ "name": "Ann" })))
            .unwrap();
        assert_eq!(mail.subject, "Hello Ann, order A-1");
    }

    #[test]
    fn test_user_binding_does_not_leak_between_calls() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "[{{user.name}}]" })),
            json!({}),
            english(),
        )
        .unwrap();

        let first = engine
            .create_mail_message(&recipient("en", Some("a@b.com"), json!({ "name": "Ann" })))
            .unwrap();
        let second = engine
            .create_mail_message(&recipient("en", Some("b@b.com"), json!({})))
            .unwrap();

        assert_eq!(first.subject, "[Ann]");
        assert_eq!(second.subject, "[]");
    }

    #[test]
    fn test_push_token_is_device() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            TemplateDefinitions {
                mail: None,
                push: Some(json!({
                    "token": "ignored",
                    "notification": { "title": "Hi {{user.name}}" },
                    "data": { "kind": "welcome" }
                })),
            },
            json!({}),
            english(),
        )
        .unwrap();

        let message = engine
            .create_push_message(&recipient("en", None, json!({ "name": "Ann" })), "device-1")
            .unwrap();

        assert_eq!(message.token, "device-1");
        assert_eq!(message.notification, Some(json!({ "title": "Hi Ann" })));
        assert_eq!(message.data, Some(json!({ "kind": "welcome" })));
        assert!(message.apns.is_none());
    }

    #[test]
    fn test_unknown_language_is_payload_not_found() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "x" })),
            json!({}),
            english(),
        )
        .unwrap();

        let err = engine
            .create_mail_message(&recipient("fr", Some("a@b.com"), json!({})))
            .unwrap_err();
        assert!(matches!(err, TemplateError::PayloadNotFound(ref id) if id == "fr"));
    }

    #[test]
    fn test_missing_channel_fails_at_render() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "x" })),
            json!({}),
            english(),
        )
        .unwrap();

        assert!(!engine.has_channel(ServiceType::Push));
        let err = engine
            .create_push_message(&recipient("en", None, json!({})), "device-1")
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::NotFound { channel: Some(ServiceType::Push), .. }
        ));
    }

    #[test]
    fn test_no_channel_fails_construction() {
        let err = TemplatingEngine::from_definitions(
            "acme",
            "missing",
            TemplateDefinitions::default(),
            json!({}),
            english(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TemplateError::NotFound { channel: None, .. }));
    }

    #[test]
    fn test_syntax_error_names_channel_path() {
        let err = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "Hi {{user..name}}" })),
            json!({}),
            english(),
        )
        .err()
        .unwrap();

        match err {
            TemplateError::Syntax { path, .. } => assert_eq!(path, "MAIL.subject"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_root_must_be_object() {
        let err = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!("just a string")),
            json!({}),
            english(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TemplateError::Syntax { ref path, .. } if path == "MAIL"));
    }

    #[test]
    fn test_duplicate_language_first_wins() {
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            mail_only(json!({ "subject": "{{language.greeting}}" })),
            json!({}),
            vec![
                LanguagePayload {
                    language_id: "en".to_string(),
                    payload: json!({ "greeting": "first" }),
                },
                LanguagePayload {
                    language_id: "en".to_string(),
                    payload: json!({ "greeting": "second" }),
                },
            ],
        )
        .unwrap();

        assert_eq!(engine.language_ids().count(), 1);
        let mail = engine
            .create_mail_message(&recipient("en", Some("a@b.com"), json!({})))
            .unwrap();
        assert_eq!(mail.subject, "first");
    }

    #[test]
    fn test_missing_address_before_render() {
        // No MAIL template at all: the address check still comes first
        let engine = TemplatingEngine::from_definitions(
            "acme",
            "welcome",
            TemplateDefinitions {
                mail: None,
                push: Some(json!({})),
            },
            json!({}),
            english(),
        )
        .unwrap();

        let err = engine
            .create_mail_message(&recipient("en", None, json!({})))
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingAddress(ServiceType::Mail)));
    }

    #[tokio::test]
    async fn test_load_from_loader() {
        let loader = MemoryTemplateLoader::new();
        loader.insert("acme", "welcome", ServiceType::Mail, json!({ "subject": "Hi" }));

        let engine = TemplatingEngine::load(&loader, "acme", "welcome", json!({}), english())
            .await
            .unwrap();

        assert_eq!(engine.platform_id(), "acme");
        assert_eq!(engine.template_id(), "welcome");
        assert!(engine.has_channel(ServiceType::Mail));
        assert!(!engine.has_channel(ServiceType::Push));
    }
}
