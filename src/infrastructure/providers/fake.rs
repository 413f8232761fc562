use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::Capability;
use crate::domain::models::Generation;
use crate::domain::models::GenerationRequest;
use crate::domain::models::Provider;
use crate::domain::models::ProviderBox;
use crate::domain::models::ProviderDescriptor;
use crate::domain::models::ProviderName;

/// In-memory provider that echoes `"{name}: {prompt}"`, or fails every call.
pub struct FakeProvider {
    descriptor: ProviderDescriptor,
    fail: bool,
    calls: Arc<AtomicUsize>,
    last_request: Arc<std::sync::Mutex<Option<GenerationRequest>>>,
}

pub struct FakeHandle {
    calls: Arc<AtomicUsize>,
    last_request: Arc<std::sync::Mutex<Option<GenerationRequest>>>,
}

impl FakeHandle {
    pub fn calls(&self) -> usize {
        return self.calls.load(Ordering::SeqCst);
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        return self.last_request.lock().unwrap().clone();
    }
}

impl FakeProvider {
    pub fn boxed(
        name: ProviderName,
        token: &str,
        capabilities: Vec<Capability>,
        priority: u32,
        fail: bool,
    ) -> (ProviderBox, FakeHandle) {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(std::sync::Mutex::new(None));
        let provider = FakeProvider {
            descriptor: ProviderDescriptor {
                name,
                url: "http://localhost".to_string(),
                token: token.to_string(),
                capabilities,
                priority,
            },
            fail,
            calls: calls.clone(),
            last_request: last_request.clone(),
        };

        return (
            Box::new(provider),
            FakeHandle {
                calls,
                last_request,
            },
        );
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        return &self.descriptor;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.fail {
            bail!("{} is down", self.descriptor.name);
        }
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.fail {
            bail!("{} exploded", self.descriptor.name);
        }

        let name = self.descriptor.name;
        let model = request.options.model.clone().unwrap_or("fake".to_string());
        if request.capability == Capability::Image {
            return Ok(Generation::image(name, &model, "data:image/png;base64,abc"));
        }
        return Ok(Generation::text(
            name,
            &model,
            &format!("{name}: {}", request.prompt),
        ));
    }
}
