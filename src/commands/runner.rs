//! Runs a transfer on a worker thread
//!
//! The controller lives on the worker; its events come back over a
//! channel and drive the progress display on the calling thread.

use super::progress::IndicatifProgress;
use crate::cli::LinkArgs;

use eeprog_core::ChipGeometry;
use eeprog_serial::{
    ChannelObserver, Connector, FileSink, Observer, SerialConnector, SessionOptions,
    TransferController,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// What to do once connected
pub enum Transfer {
    Read {
        offset: u32,
        size: usize,
        output: PathBuf,
    },
    Write {
        offset: u32,
        data: Vec<u8>,
        verify: bool,
    },
    Verify {
        offset: u32,
        data: Vec<u8>,
    },
}

impl Transfer {
    fn run<C: Connector, O: Observer>(
        &self,
        controller: &TransferController<C, O>,
        port: &str,
        geometry: &ChipGeometry,
    ) -> eeprog_serial::Result<()> {
        match self {
            Transfer::Read {
                offset,
                size,
                output,
            } => {
                let mut sink = FileSink::new(output);
                controller.read(port, geometry, *offset, *size, &mut sink)
            }
            Transfer::Write {
                offset,
                data,
                verify,
            } => {
                controller.write(port, geometry, *offset, data)?;
                if *verify {
                    controller.verify(port, geometry, *offset, data)?;
                }
                Ok(())
            }
            Transfer::Verify { offset, data } => controller.verify(port, geometry, *offset, data),
        }
    }
}

/// Pick the connector for `port` and run `transfer`
pub fn execute(
    link: &LinkArgs,
    port: &str,
    geometry: &ChipGeometry,
    transfer: &Transfer,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = SessionOptions {
        read_retries: link.retries,
        ..SessionOptions::default()
    };

    #[cfg(feature = "dummy")]
    {
        if port.eq_ignore_ascii_case(eeprog_dummy::DUMMY_PORT) {
            log::info!("Using the emulated programmer");
            let connector = eeprog_dummy::DummyConnector::default();
            return run_on_worker(connector, options.clone(), port, geometry, transfer);
        }
    }

    let connector = SerialConnector {
        baud: link.baud,
        timeout: Duration::from_millis(link.timeout_ms),
    };
    run_on_worker(connector, options, port, geometry, transfer)
}

fn run_on_worker<C: Connector + Send>(
    connector: C,
    options: SessionOptions,
    port: &str,
    geometry: &ChipGeometry,
    transfer: &Transfer,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let mut progress = IndicatifProgress::new();

    let joined = thread::scope(|s| {
        let worker = s.spawn(move || {
            // Dropping the controller at the end closes the event channel
            let controller =
                TransferController::new(connector, ChannelObserver::new(tx)).with_options(options);
            transfer.run(&controller, port, geometry)
        });

        for event in rx {
            progress.handle(&event);
        }
        worker.join()
    });
    progress.finish();

    match joined {
        Ok(result) => Ok(result?),
        Err(_) => Err("Transfer thread panicked".into()),
    }
}
