//! Action providers: named operations, each with an input schema and a typed handler, gated by
//! a pure network-support predicate.

pub mod erc20;
pub mod wallet;

use crate::errors::ToolError;
use crate::network::{resolve_identity, NetworkIdentity, ProtocolFamily};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use erc20::Erc20ActionProvider;
pub use wallet::WalletActionProvider;

pub type ActionResult = Result<String, ToolError>;
pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send>>;

type Handler<W> = Arc<dyn Fn(Arc<W>, Value) -> ActionFuture + Send + Sync>;

/// One operation as registered: metadata plus a handler over raw JSON arguments.
pub struct ActionSpec<W: ?Sized> {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
    handler: Handler<W>,
}

impl<W: ?Sized> Clone for ActionSpec<W> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<W: ?Sized> std::fmt::Debug for ActionSpec<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<W: ?Sized + Send + Sync + 'static> ActionSpec<W> {
    /// Register `handler` for arguments of type `A`. Arguments that do not deserialize into `A`
    /// are rejected with `invalid_arguments` before the handler runs.
    pub fn new<A, F, Fut>(
        name: &'static str,
        description: &'static str,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(Arc<W>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let handler: Handler<W> = Arc::new(move |wallet: Arc<W>, args: Value| -> ActionFuture {
            match serde_json::from_value::<A>(args) {
                Ok(a) => Box::pin(handler(wallet, a)),
                Err(e) => Box::pin(std::future::ready(Err(ToolError::invalid_arguments(
                    format!("{name}: {e}"),
                )))),
            }
        });
        Self {
            name,
            description,
            input_schema,
            handler,
        }
    }
}

impl<W: ?Sized> ActionSpec<W> {
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn bind(&self, wallet: &Arc<W>) -> Action<W> {
        Action {
            spec: self.clone(),
            wallet: Arc::clone(wallet),
        }
    }
}

/// An operation bound to the session's wallet, ready to invoke.
pub struct Action<W: ?Sized> {
    spec: ActionSpec<W>,
    wallet: Arc<W>,
}

impl<W: ?Sized> std::fmt::Debug for Action<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.spec.name)
            .finish_non_exhaustive()
    }
}

impl<W: ?Sized> Action<W> {
    pub const fn name(&self) -> &'static str {
        self.spec.name
    }

    pub const fn description(&self) -> &'static str {
        self.spec.description
    }

    pub const fn input_schema(&self) -> &Value {
        &self.spec.input_schema
    }

    pub async fn invoke(&self, args: Value) -> ActionResult {
        let args = if args.is_null() { json!({}) } else { args };
        tracing::debug!(action = self.spec.name, "invoking action");
        (self.spec.handler)(Arc::clone(&self.wallet), args).await
    }

    /// `{name, description, inputSchema}` for a tool-calling layer.
    pub fn tool_schema(&self) -> Value {
        json!({
            "name": self.spec.name,
            "description": self.spec.description,
            "inputSchema": self.spec.input_schema,
        })
    }
}

/// A plugin contributing operations for the networks it supports.
pub trait ActionProvider<W: ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    /// Pure and total: malformed or partial identities yield `false`.
    fn supports_network(&self, network: &NetworkIdentity) -> bool;

    /// Operations in registration order.
    fn actions(&self) -> Vec<ActionSpec<W>>;
}

/// Declarative network predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSupport {
    Any,
    Families(Vec<ProtocolFamily>),
    NetworkIds(Vec<String>),
}

impl NetworkSupport {
    pub fn matches(&self, network: &NetworkIdentity) -> bool {
        if !network.is_well_formed() {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Families(f) => f.contains(&network.protocol_family),
            Self::NetworkIds(ids) => {
                // An identity carrying only a chain id still matches through the table.
                let id = network
                    .network_id()
                    .map(str::to_owned)
                    .or_else(|| resolve_identity(network).ok().map(|c| c.network_id.to_owned()));
                id.is_some_and(|id| ids.iter().any(|n| *n == id))
            }
        }
    }
}

/// A provider defined entirely by its registration table.
pub struct TableActionProvider<W: ?Sized> {
    name: String,
    support: NetworkSupport,
    actions: Vec<ActionSpec<W>>,
}

impl<W: ?Sized> std::fmt::Debug for TableActionProvider<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableActionProvider")
            .field("name", &self.name)
            .field("support", &self.support)
            .field("actions", &self.actions.iter().map(ActionSpec::name).collect::<Vec<_>>())
            .finish()
    }
}

impl<W: ?Sized> TableActionProvider<W> {
    pub fn new(name: impl Into<String>, support: NetworkSupport, actions: Vec<ActionSpec<W>>) -> Self {
        Self {
            name: name.into(),
            support,
            actions,
        }
    }
}

impl<W: ?Sized + Send + Sync> ActionProvider<W> for TableActionProvider<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_network(&self, network: &NetworkIdentity) -> bool {
        self.support.matches(network)
    }

    fn actions(&self) -> Vec<ActionSpec<W>> {
        self.actions.clone()
    }
}

pub(crate) fn to_json(v: &Value) -> ActionResult {
    serde_json::to_string(v).map_err(|e| ToolError::new("internal_error", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct EchoArgs {
        word: String,
    }

    fn echo() -> ActionSpec<()> {
        ActionSpec::new::<EchoArgs, _, _>(
            "echo",
            "Repeat a word.",
            json!({ "type": "object", "properties": { "word": { "type": "string" } } }),
            |_w, a| async move { Ok(a.word) },
        )
    }

    #[tokio::test]
    async fn typed_arguments_reach_the_handler() -> eyre::Result<()> {
        let action = echo().bind(&Arc::new(()));
        let out = action
            .invoke(json!({ "word": "gm" }))
            .await
            .map_err(|e| eyre::eyre!("{}", e.message))?;
        assert_eq!(out, "gm");
        Ok(())
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_arguments() {
        let action = echo().bind(&Arc::new(()));
        let err = action.invoke(json!({ "word": 3 })).await.err();
        assert_eq!(err.map(|e| e.code), Some("invalid_arguments"));
    }

    #[test]
    fn malformed_identities_never_match() {
        let preds = [
            NetworkSupport::Any,
            NetworkSupport::Families(vec![ProtocolFamily::Evm]),
            NetworkSupport::NetworkIds(vec!["base-sepolia".into()]),
        ];
        let malformed = [
            NetworkIdentity::default(),
            NetworkIdentity::new(ProtocolFamily::Evm, Some("  "), None),
            NetworkIdentity::new(ProtocolFamily::Unknown, Some("84532"), Some("base-sepolia")),
        ];
        for p in &preds {
            for id in &malformed {
                assert!(!p.matches(id), "{p:?} matched {id:?}");
            }
        }
    }

    #[test]
    fn network_ids_match_through_the_chain_id() {
        let p = NetworkSupport::NetworkIds(vec!["base-sepolia".into()]);
        assert!(p.matches(&NetworkIdentity::new(ProtocolFamily::Evm, Some("84532"), None)));
        assert!(!p.matches(&NetworkIdentity::with_network_id(ProtocolFamily::Evm, "base-mainnet")));
    }

    #[test]
    fn families_match_by_family_only() {
        let p = NetworkSupport::Families(vec![ProtocolFamily::Svm]);
        assert!(p.matches(&NetworkIdentity::with_network_id(ProtocolFamily::Svm, "solana-devnet")));
        assert!(!p.matches(&NetworkIdentity::with_network_id(ProtocolFamily::Evm, "base-sepolia")));
    }

    #[test]
    fn table_provider_keeps_registration_order() {
        let second = ActionSpec::new::<EchoArgs, _, _>("second", "", json!({}), |_w, a| async move {
            Ok(a.word)
        });
        let p = TableActionProvider::new("table", NetworkSupport::Any, vec![echo(), second]);
        let names: Vec<_> = p.actions().iter().map(ActionSpec::name).collect();
        assert_eq!(names, vec!["echo", "second"]);
    }
}
