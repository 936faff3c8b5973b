//! Remote method dispatch for one process.
//!
//! The [`Controller`] owns the process's handler registry and runs its RMI
//! loop: take a trigger off the endpoint, look the tag up, run the handler.

use crate::channel::{RmiRequest, BREAK_RMI_TAG};
use crate::context::ProcessContext;
use crate::error::{PortError, Result, ResultExt};
use crate::port::ProducerPort;
use crate::pipeline::PipelineSource;
use crate::types::{ProcessId, Tag};
use std::collections::HashMap;

/// Something that answers remote method triggers.
pub trait RmiHandler: Send {
    /// Tags this handler answers.
    fn rmi_tags(&self) -> Vec<Tag>;

    /// Run the method registered under `tag` on behalf of `remote`.
    fn handle_rmi(&mut self, remote: ProcessId, tag: Tag) -> Result<()>;
}

pub struct Controller {
    context: ProcessContext,
    handlers: Vec<Box<dyn RmiHandler>>,
    routes: HashMap<Tag, usize>,
}

impl Controller {
    pub fn new(context: ProcessContext) -> Self {
        Self {
            context,
            handlers: Vec::new(),
            routes: HashMap::new(),
        }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Register a handler under all of its tags.
    ///
    /// Fails without registering anything if one of the tags is taken.
    pub fn add_handler(&mut self, handler: Box<dyn RmiHandler>) -> Result<()> {
        let tags = handler.rmi_tags();
        for tag in &tags {
            if *tag == BREAK_RMI_TAG || self.routes.contains_key(tag) {
                return Err(PortError::Config(format!(
                    "RMI tag {} is already registered on process {}",
                    tag,
                    self.context.process_id()
                )));
            }
        }
        let index = self.handlers.len();
        self.handlers.push(handler);
        for tag in tags {
            self.routes.insert(tag, index);
        }
        Ok(())
    }

    /// Register a producer port on its metadata and data tags.
    pub fn register_producer<S>(&mut self, port: ProducerPort<S>) -> Result<()>
    where
        S: PipelineSource + Send + 'static,
    {
        let tag = port.tag();
        let data_tag = tag.offset(1).ok_or_else(|| {
            PortError::Config(format!("producer tag {} leaves no room for its data tag", tag))
        })?;
        self.add_handler(Box::new(port))?;
        tracing::info!(
            "Process {}: producer registered on tags {} and {}",
            self.context.process_id(),
            tag,
            data_tag
        );
        Ok(())
    }

    pub fn registered_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.routes.keys().copied().collect();
        tags.sort();
        tags
    }

    /// Answer triggers until a break trigger arrives. Returns how many were handled.
    pub fn serve(&mut self) -> Result<u64> {
        tracing::info!("Process {}: RMI loop started", self.context.process_id());
        let mut handled = 0;
        loop {
            let request = self.context.channel().receive_rmi()?;
            if request.tag == BREAK_RMI_TAG {
                tracing::info!(
                    "Process {}: break from process {} after {} requests",
                    self.context.process_id(),
                    request.from,
                    handled
                );
                return Ok(handled);
            }
            if self.dispatch(request)? {
                handled += 1;
            }
        }
    }

    /// Handle every queued trigger without blocking.
    ///
    /// A break trigger stops processing; triggers behind it stay queued.
    pub fn process_pending(&mut self) -> Result<u64> {
        let mut handled = 0;
        while let Some(request) = self.context.channel().try_receive_rmi()? {
            if request.tag == BREAK_RMI_TAG {
                break;
            }
            if self.dispatch(request)? {
                handled += 1;
            }
        }
        Ok(handled)
    }

    fn dispatch(&mut self, request: RmiRequest) -> Result<bool> {
        let Some(handler) = self
            .routes
            .get(&request.tag)
            .and_then(|&i| self.handlers.get_mut(i))
        else {
            self.context.diagnostics().error(format!(
                "Process {}: no RMI registered for tag {} (from process {})",
                self.context.process_id(),
                request.tag,
                request.from
            ));
            return Ok(false);
        };
        handler
            .handle_rmi(request.from, request.tag)
            .with_context(|| format!("RMI {} from process {}", request.tag, request.from))?;
        Ok(true)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("process", &self.context.process_id())
            .field("tags", &self.registered_tags())
            .finish_non_exhaustive()
    }
}

/// Ask `process` to leave its [`Controller::serve`] loop.
pub fn send_break(context: &ProcessContext, process: ProcessId) -> Result<()> {
    context.channel().trigger_remote(process, BREAK_RMI_TAG)
}
