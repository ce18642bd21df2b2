use crate::domain::{DomainResult, RuleDefinition, RuleSource};
use crate::http::client::{join_url, JsonHttpClient};
use crate::http::models::{ItemList, RuleModel};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Reads rule definitions from the rules service (`GET <base>/rules`).
pub struct HttpRuleSource {
    client: JsonHttpClient,
    rules_url: String,
}

impl HttpRuleSource {
    pub fn new(client: JsonHttpClient, base_url: &str) -> Self {
        Self {
            client,
            rules_url: join_url(base_url, "rules"),
        }
    }
}

#[async_trait]
impl RuleSource for HttpRuleSource {
    #[instrument(skip(self))]
    async fn get_all(&self) -> DomainResult<Vec<RuleDefinition>> {
        let list: Option<ItemList<RuleModel>> =
            self.client.get_json(&self.rules_url, &[], false).await?;
        let rules: Vec<RuleDefinition> = list
            .map(|l| l.items.into_iter().map(Into::into).collect())
            .unwrap_or_default();

        debug!(rule_count = rules.len(), "fetched rules");
        Ok(rules)
    }
}
