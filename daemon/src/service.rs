use std::sync::Arc;

use tracing::{debug, error};

use crate::dispatcher::{RateLimitedDispatcher, RateLimits};
use crate::enhancer::EnhancementClient;
use crate::error::EnhanceError;
use crate::prompts::{builtin_prompts, compose, is_known, menu_entries, resolve, MenuEntry};
use crate::settings::SettingsStore;

/// Everything behind an `enhanceText` request: fresh settings, prompt
/// lookup and the rate-limited remote call.
pub struct EnhancementService {
    store: SettingsStore,
    client: Arc<EnhancementClient>,
    dispatcher: RateLimitedDispatcher<Result<String, EnhanceError>>,
}

impl EnhancementService {
    pub fn new(store: SettingsStore, client: EnhancementClient, limits: RateLimits) -> Self {
        Self {
            store,
            client: Arc::new(client),
            dispatcher: RateLimitedDispatcher::new(limits),
        }
    }

    pub async fn enhance(&self, prompt_id: &str, selected_text: &str) -> Result<String, EnhanceError> {
        let store = self.store.clone();
        let client = Arc::clone(&self.client);
        let id = prompt_id.to_string();
        let text = selected_text.to_string();

        let queued = self.dispatcher.submit(move || async move {
            let settings = store.load().await?;
            let builtins = builtin_prompts();
            let template = resolve(&id, &builtins, &settings.custom_prompts)?;
            client.enhance(&compose(template, &text), &settings).await
        });
        debug!(prompt_id, queued = self.dispatcher.pending(), "enhance request submitted");

        let result = queued.await.and_then(|outcome| outcome);
        if let Err(error) = &result {
            error!(prompt_id, "error enhancing text: {error}");
        }
        result
    }

    /// Contextual menu for the current prompt set.
    pub async fn menu(&self) -> Result<Vec<MenuEntry>, EnhanceError> {
        let settings = self.store.load().await?;
        Ok(menu_entries(&builtin_prompts(), &settings.custom_prompts))
    }

    pub async fn knows_prompt(&self, prompt_id: &str) -> Result<bool, EnhanceError> {
        let settings = self.store.load().await?;
        Ok(is_known(prompt_id, &builtin_prompts(), &settings.custom_prompts))
    }
}
