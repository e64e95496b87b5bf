// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::sync::Arc;

use log::{error, info, warn};

use crate::Result;
use crate::config::Config;
use crate::configfs::Registrar;
use crate::group::OverlayGroup;
use crate::subsystem::RootSubsystem;
use crate::tree::OverlayTree;

/// A registered overlay interface: the root namespace and its overlay group.
///
/// Created by [`OverlayModule::init`] and torn down by
/// [`OverlayModule::exit`].
#[derive(Debug)]
pub struct OverlayModule<T: OverlayTree + 'static, R: Registrar> {
    registrar: R,
    config: Config,
    subsystem: Arc<RootSubsystem<T>>,
}

impl<T: OverlayTree + 'static, R: Registrar> OverlayModule<T, R> {
    /// Registers the root namespace and then the overlay group beneath it.
    ///
    /// # Errors
    ///
    /// Returns the registrar's error. If the group cannot be registered, the
    /// root namespace is unregistered again before returning.
    pub fn init(registrar: R, tree: Arc<T>, config: Config) -> Result<Self> {
        let group = Arc::new(OverlayGroup::new(tree, config.read_limit));
        let subsystem = Arc::new(RootSubsystem::new(config.group, group.clone()));

        registrar
            .register_subsystem(config.subsystem, subsystem.clone())
            .inspect_err(|e| error!("failed to register {}: {e}", config.subsystem))?;
        if let Err(e) = registrar.register_group(config.subsystem, config.group, group) {
            error!(
                "failed to register {}/{}: {e}",
                config.subsystem, config.group
            );
            if let Err(e) = registrar.unregister_subsystem(config.subsystem) {
                warn!("failed to unregister {}: {e}", config.subsystem);
            }
            return Err(e);
        }

        info!("{}/{} registered", config.subsystem, config.group);
        Ok(Self {
            registrar,
            config,
            subsystem,
        })
    }

    /// Returns the overlay group.
    #[must_use]
    pub fn group(&self) -> &Arc<OverlayGroup<T>> {
        self.subsystem.group()
    }

    /// Returns the configuration the module was registered with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unregisters the overlay group, which drops and detaches every remaining
    /// item, and then the root namespace.
    pub fn exit(self) {
        let Config {
            subsystem, group, ..
        } = self.config;
        if let Err(e) = self.registrar.unregister_group(subsystem, group) {
            warn!("failed to unregister {subsystem}/{group}: {e}");
        }
        for name in self.group().names() {
            if let Err(e) = self.group().remove(&name) {
                warn!("overlay {name}: failed to drop: {e}");
            }
        }
        if let Err(e) = self.registrar.unregister_subsystem(subsystem) {
            warn!("failed to unregister {subsystem}: {e}");
        }
        info!("{subsystem}/{group} unregistered");
    }
}
