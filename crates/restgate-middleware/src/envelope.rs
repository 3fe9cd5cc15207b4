//! Response envelope assembly.

use crate::context::{GateContext, Lifecycle};
use indexmap::IndexMap;
use restgate_config::GateConfig;
use restgate_core::{
    is_empty_value, AuditPatch, CredentialAliases, EnvelopeMeta, ResponseEnvelope,
};
use serde_json::Value;

/// Builds the [`ResponseEnvelope`] from the state collected in a context.
///
/// When dumping is on, the built `meta`, the normalized input and the
/// outgoing data are also written into the audit record as JSON strings.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    aliases: CredentialAliases,
    dump: bool,
}

impl EnvelopeBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(aliases: CredentialAliases, dump: bool) -> Self {
        Self { aliases, dump }
    }

    /// Creates a builder from the gate configuration.
    ///
    /// Dumping requires both `log.enabled` and `log.dump`.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.auth.fields.clone(),
            config.log.enabled && config.log.dump,
        )
    }

    /// Returns true if snapshots are written to the audit record.
    #[must_use]
    pub fn dumps(&self) -> bool {
        self.dump
    }

    /// Assembles the envelope.
    ///
    /// `data` is the business result, or the normalized input when the
    /// result is missing or empty.
    pub async fn build(&self, ctx: &mut GateContext) -> ResponseEnvelope {
        ctx.enter(Lifecycle::BuildingResponse);

        let data_in = ctx
            .payload()
            .map_or(Value::Null, restgate_core::NormalizedPayload::to_value);
        let data = match ctx.result() {
            Some(result) if !is_empty_value(result) => result.clone(),
            _ => data_in.clone(),
        };

        let mut envelope = ResponseEnvelope {
            meta: self.meta(ctx),
            data,
        };

        if self.dump {
            let patch = AuditPatch::new().dump(
                snapshot(&envelope.meta),
                snapshot(&data_in),
                snapshot(&envelope.data),
            );
            ctx.merge_audit(patch).await;
            // The merge may have added a warning.
            envelope.meta.feedback = ctx.feedback().flatten();
            envelope.meta.status = ctx.feedback().status();
        }

        envelope
    }

    fn meta(&self, ctx: &GateContext) -> EnvelopeMeta {
        let credentials: IndexMap<String, Option<String>> = self
            .aliases
            .iter()
            .map(|(_, field)| (field.to_string(), ctx.resolve(field).map(str::to_string)))
            .collect();

        EnvelopeMeta {
            status: ctx.feedback().status(),
            feedback: ctx.feedback().flatten(),
            request: ctx.metadata().clone(),
            credentials,
        }
    }
}

fn snapshot<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTrail;
    use restgate_core::{
        AuditRecord, EnvelopeStatus, MemoryAuditStore, NormalizedPayload, RequestMetadata,
        RouteInfo,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn context(store: Arc<MemoryAuditStore>) -> GateContext {
        GateContext::new(
            Arc::new(GateConfig::default()),
            RouteInfo::new("Users", "edit", "User"),
        )
        .with_auth_header("TRUEREST username=john&apikey=abc123&class=Customer")
        .with_metadata(RequestMetadata::from_pairs([("REQUEST_METHOD", "PUT")]))
        .with_audit(AuditTrail::new(store))
    }

    #[tokio::test]
    async fn test_credentials_always_present() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut ctx = GateContext::new(
            Arc::new(GateConfig::default()),
            RouteInfo::new("Users", "view", "User"),
        )
        .with_auth_header("TRUEREST apikey=abc123")
        .with_audit(AuditTrail::new(store));

        let envelope = EnvelopeBuilder::new(CredentialAliases::default(), false)
            .build(&mut ctx)
            .await;

        let credentials = serde_json::to_value(&envelope.meta.credentials).unwrap();
        assert_eq!(
            credentials,
            json!({"class": null, "apikey": "abc123", "username": null})
        );
        assert_eq!(envelope.meta.status, EnvelopeStatus::Ok);
        assert_eq!(ctx.lifecycle(), Lifecycle::BuildingResponse);
    }

    #[tokio::test]
    async fn test_echoes_input_when_result_empty() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut ctx = context(store);
        let payload = NormalizedPayload::normalize("User", &json!({"name": "john"})).unwrap();
        ctx.set_payload(payload);
        ctx.set_result(json!({}));

        let envelope = EnvelopeBuilder::default().build(&mut ctx).await;
        assert_eq!(envelope.data, json!({"User": {"name": "john"}}));
        assert_eq!(envelope.meta.request.get("request_method"), Some("PUT"));
    }

    #[tokio::test]
    async fn test_result_wins_over_input() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut ctx = context(store);
        ctx.set_payload(NormalizedPayload::normalize("User", &json!({"name": "john"})).unwrap());
        ctx.set_result(json!({"User": {"id": 7}}));

        let envelope = EnvelopeBuilder::default().build(&mut ctx).await;
        assert_eq!(envelope.data, json!({"User": {"id": 7}}));
    }

    #[tokio::test]
    async fn test_dump_writes_snapshots() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut ctx = context(store.clone());
        ctx.audit_mut()
            .open(AuditRecord::new("Users", "edit"))
            .await
            .unwrap();
        ctx.set_payload(NormalizedPayload::normalize("User", &json!({"name": "john"})).unwrap());

        let builder = EnvelopeBuilder::from_config(&GateConfig::default());
        assert!(builder.dumps());
        builder.build(&mut ctx).await;
        ctx.finalize().await;

        let record = &store.records()[0];
        let meta: Value = serde_json::from_str(record.meta.as_deref().unwrap()).unwrap();
        assert_eq!(meta["credentials"]["username"], json!("john"));
        assert_eq!(record.data_in.as_deref(), Some(r#"{"User":{"name":"john"}}"#));
        assert_eq!(record.data_out, record.data_in);
    }
}
