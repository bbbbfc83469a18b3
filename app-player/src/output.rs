use std::fmt;
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use failure::Fail;
use log::{debug, info, warn};

use crossbeam_channel::{Receiver, Sender};

use hero_timing_core::time::Seconds;
use hero_timing_core::transport::DispatchSink;

#[derive(Debug, Fail)]
pub enum OutputError {
  #[fail(display = "Failed to create the click output thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the click output thread")]
  Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Click {
  Bar,
  Beat,
}

impl fmt::Display for Click {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Click::Bar => write!(f, "BAR"),
      Click::Beat => write!(f, "beat"),
    }
  }
}

pub enum Protocol {
  Stop,

  Click { time: Seconds, click: Click },
}

///! Forwards the transport dispatches to the output thread.
pub struct ChannelSink {
  protocol_tx: Sender<Protocol>,
  bars: u32,
}

impl ChannelSink {
  pub fn new(protocol_tx: Sender<Protocol>) -> ChannelSink {
    ChannelSink {
      protocol_tx,
      bars: 0,
    }
  }

  /// Bars dispatched so far.
  pub fn bars(&self) -> u32 {
    self.bars
  }
}

impl DispatchSink<Click> for ChannelSink {
  fn dispatch(&mut self, time: Seconds, click: &Click) {
    if *click == Click::Bar {
      self.bars += 1;
    }
    let message = Protocol::Click {
      time,
      click: *click,
    };
    if let Err(err) = self.protocol_tx.send(message) {
      warn!("Failed to send the {} click at {:.3}s: {}", click, time, err);
    }
  }
}

struct ClickOutputThread {
  origin: Instant,
}

impl ClickOutputThread {
  fn handle_messages(&mut self, protocol_rx: Receiver<Protocol>) {
    info!("Handling click messages ...");

    for message in protocol_rx.iter() {
      match message {
        Protocol::Stop => {
          info!("Click output thread stopped ...");
          break;
        }

        Protocol::Click { time, click } => self.play(time, click),
      }
    }
  }

  // Waits until the click is due, the dispatch arrives up to a look-ahead earlier.
  fn play(&mut self, time: Seconds, click: Click) {
    let due = self.origin + Duration::from_nanos((time.max(0.0) * 1e9) as u64);
    let now = Instant::now();
    if due > now {
      thread::sleep(due - now);
    } else {
      let late = now - due;
      warn!("Click at {:.3}s is late by {:?}", time, late);
    }
    info!("{:>9.3}s {}", time, click);
  }
}

pub struct ClickOutput {
  handler: JoinHandle<()>,
  protocol_tx: Sender<Protocol>,
}

impl ClickOutput {
  /// Spawns the output thread. Click times are seconds since `origin`.
  pub fn new(origin: Instant) -> Result<ClickOutput, OutputError> {
    info!("Spawning click output thread ...");

    let (protocol_tx, protocol_rx) = crossbeam_channel::unbounded::<Protocol>();

    thread::Builder::new()
      .name("click-output".into())
      .spawn(move || ClickOutputThread { origin }.handle_messages(protocol_rx))
      .map_err(|err| OutputError::Start {
        cause: err.to_string(),
      })
      .map(|handler| ClickOutput {
        handler,
        protocol_tx,
      })
  }

  pub fn sink(&self) -> ChannelSink {
    ChannelSink::new(self.protocol_tx.clone())
  }

  pub fn stop(self) -> Result<(), OutputError> {
    debug!("Stopping click output thread ...");

    self
      .protocol_tx
      .send(Protocol::Stop)
      .map_err(|_| OutputError::Stop)
      .and_then(|()| self.handler.join().map_err(|_| OutputError::Stop))
  }
}
