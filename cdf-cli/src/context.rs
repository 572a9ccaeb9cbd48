use std::sync::Arc;

use cdf_cli_core::credentials::{CredentialArgs, CredentialResolver, Prompt};
use cdf_cli_core::{CdfError, Result};
use tokio::sync::OnceCell;

use crate::client::CdfClient;

/// Per-process state handed to every command.
///
/// Credentials are resolved, and the client built, on the first call to
/// [`CdfContext::client`]. Later calls return the same client.
pub struct CdfContext {
    args: CredentialArgs,
    prompt: Option<Box<dyn Prompt>>,
    client: OnceCell<Arc<CdfClient>>,
}

impl CdfContext {
    pub fn new(args: CredentialArgs, prompt: Option<Box<dyn Prompt>>) -> Self {
        Self {
            args,
            prompt,
            client: OnceCell::new(),
        }
    }

    pub async fn client(&self) -> Result<Arc<CdfClient>> {
        self.client
            .get_or_try_init(|| async {
                let resolver = CredentialResolver::new(self.args.clone(), self.prompt.as_deref());
                let credentials = resolver.resolve()?.require()?;
                Ok::<_, CdfError>(Arc::new(CdfClient::new(credentials)?))
            })
            .await
            .cloned()
    }
}
