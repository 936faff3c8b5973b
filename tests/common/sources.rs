//! Pipeline sources with scripted failures

use pipeport::pipeline::PipelineSource;
use pipeport::{DataKind, DataObject, Extent, GeneratorSource, OutputDescriptor, PortError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Generator whose next `fail_next(n)` executions return an error.
#[derive(Clone)]
pub struct FlakySource {
    inner: GeneratorSource,
    failures: Arc<AtomicU32>,
}

impl FlakySource {
    pub fn new(inner: GeneratorSource) -> Self {
        Self {
            inner,
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn generator(&self) -> &GeneratorSource {
        &self.inner
    }
}

impl PipelineSource for FlakySource {
    fn update_information(&mut self) -> pipeport::Result<(DataKind, OutputDescriptor)> {
        self.inner.update_information()
    }

    fn update_data(&mut self, extent: Extent) -> pipeport::Result<DataObject> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(PortError::Source("reader crashed".into()));
        }
        self.inner.update_data(extent)
    }
}
