// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The long-running host: the controller loop plus a retention loop per data
//! category, each on its own named thread.


use std::{sync::Arc, thread, thread::JoinHandle, time::Duration};

use crossbeam_channel::{bounded, Sender};
use log::{debug, info};
use strum::IntoEnumIterator;

use crate::{
    cache::run_retention_loop,
    catalog::{Catalog, DataCategory},
    config::RuntimeConfig,
    controller::{new_status, Controller, OperatorHandle},
    hardware::{share_hardware, CorrelatorHardware},
    pipeline::{join_with_timeout, stop_requested, Command, PipelineError},
};

struct Worker {
    name: String,
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

fn spawn_worker(
    name: String,
    commands: Sender<Command>,
    f: impl FnOnce() + Send + 'static,
) -> Worker {
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .expect("OS can create threads");
    Worker {
        name,
        commands,
        handle,
    }
}

pub struct ControlService {
    workers: Vec<Worker>,
    operator: OperatorHandle,
    join_timeout: Duration,
}

impl ControlService {
    pub fn start(
        config: RuntimeConfig,
        hardware: Box<dyn CorrelatorHardware>,
        catalog: Arc<dyn Catalog>,
    ) -> ControlService {
        let (status, operator) = new_status(&config);
        let join_timeout = config.pipeline.join_timeout();
        let mut workers = Vec::with_capacity(3);

        for category in DataCategory::iter() {
            let (tx, rx) = bounded(1);
            let catalog = Arc::clone(&catalog);
            let base = match category {
                DataCategory::Raw => config.raw.base_path.clone(),
                DataCategory::Vis => config.vis.base_path.clone(),
            };
            let cache_config = config.cache.clone();
            workers.push(spawn_worker(format!("{category} cache"), tx, move || {
                run_retention_loop(catalog, category, base, cache_config, rx)
            }));
        }

        let (tx, rx) = bounded(1);
        let mut controller = Controller::new(config, share_hardware(hardware), catalog, status);
        workers.push(spawn_worker("controller".to_string(), tx, move || {
            while !stop_requested(&rx) {
                controller.apply_operator_request();
                controller.run();
            }
            controller.shutdown();
            debug!("Controller loop exiting");
        }));

        info!("Control service started");
        ControlService {
            workers,
            operator,
            join_timeout,
        }
    }

    /// The operator's view of, and hooks into, the controller.
    pub fn operator(&self) -> &OperatorHandle {
        &self.operator
    }

    /// Stop every loop. Each gets the configured join timeout; the first one
    /// that doesn't make it is reported.
    pub fn stop(self) -> Result<(), PipelineError> {
        for worker in &self.workers {
            let _ = worker.commands.try_send(Command::Stop);
        }
        let mut result = Ok(());
        for worker in self.workers {
            if let Err(e) = join_with_timeout(&worker.name, worker.handle, self.join_timeout) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        info!("Control service stopped");
        result
    }
}
