use std::rc::Rc;
use std::time::Duration;

use log::{debug, info};

use failure;
use failure::{Error, Fail};

use hero_timing_core::config::Config;
use hero_timing_core::time::SystemTime;
use hero_timing_core::transport::{Transport, TransportError, TransportEvent};

mod output;
use crate::output::{ChannelSink, Click, ClickOutput};

const HERO_TIMING_CONFIG: &'static str = "HERO_TIMING_CONFIG";
const DEFAULT_HERO_TIMING_CONFIG: &'static str = "timing.toml";

const HERO_TIMING_LOG_CONFIG: &'static str = "HERO_TIMING_LOG_CONFIG";
const DEFAULT_HERO_TIMING_LOG_CONFIG: &'static str = "log4rs.yaml";

const PLAY_BARS: u32 = 8;

type Player = Transport<Click, ChannelSink>;

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },

  #[fail(display = "Failed to create the transport: {}", cause)]
  TransportInit { cause: TransportError },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let time = SystemTime::new();

  let output = ClickOutput::new(time.origin())?;

  let mut transport = init_transport(&config, time, output.sink())?;

  play(&mut transport, &config)?;

  transport.dispose();

  output.stop()?;

  Ok(())
}

fn init_logging() -> Result<(), Error> {
  let log_config_path = std::env::var(HERO_TIMING_LOG_CONFIG)
    .unwrap_or_else(|_| DEFAULT_HERO_TIMING_LOG_CONFIG.to_string());

  log4rs::init_file(log_config_path.as_str(), Default::default()).map_err(|err| {
    MainError::LoggingInit {
      cause: err.to_string(),
    }
  })?;

  Ok(())
}

fn init_config() -> Result<Config, Error> {
  let config_path =
    std::env::var(HERO_TIMING_CONFIG).unwrap_or_else(|_| DEFAULT_HERO_TIMING_CONFIG.to_string());

  info!("Loading timing configuration from {} ...", config_path);
  let config = Config::from_file(config_path.as_str())?;
  debug!("{:#?}", config);

  Ok(config)
}

fn init_transport(config: &Config, time: SystemTime, sink: ChannelSink) -> Result<Player, Error> {
  info!("Initialising the transport ...");

  let mut transport = Transport::from_config(config, Rc::new(time), sink)
    .map_err(|cause| MainError::TransportInit { cause })?;

  transport.subscribe(|event| match event {
    TransportEvent::Loop { time } => info!("Loop at {:.3}s", time),
    event => debug!("{:?}", event),
  });

  transport.set_interval(Click::Bar, "1m")?;
  transport.set_interval(Click::Beat, "4n")?;

  Ok(transport)
}

fn play(transport: &mut Player, config: &Config) -> Result<(), Error> {
  let update_interval = Duration::from_micros((config.clock.update_interval * 1e6) as u64);

  let now = transport.now();
  transport.start(now);
  info!(
    "Playing {} bars at {} bpm in {} ...",
    PLAY_BARS,
    transport.bpm(),
    transport.signature()
  );

  while transport.sink().bars() <= PLAY_BARS {
    transport.update();
    std::thread::sleep(update_interval);
  }

  let position = transport.position();
  let now = transport.now();
  transport.stop(now);
  info!("Stopped at {}", position);

  Ok(())
}
