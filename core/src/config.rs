use failure;
use failure::Error;

use serde;
use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

use crate::time::{Ppq, Seconds};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Transport {
  pub bpm: f64,
  pub ppq: Ppq,
  pub signature: [u8; 2],
  pub loop_enabled: bool,
  pub loop_start: String,
  pub loop_end: String,
  pub swing: f64,
  pub swing_subdivision: String,
}

impl Default for Transport {
  fn default() -> Transport {
    Transport {
      bpm: 120.0,
      ppq: 192,
      signature: [4, 4],
      loop_enabled: false,
      loop_start: "0:0:0".to_string(),
      loop_end: "4m".to_string(),
      swing: 0.0,
      swing_subdivision: "8n".to_string(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Clock {
  pub look_ahead: Seconds,
  pub update_interval: Seconds,
}

impl Default for Clock {
  fn default() -> Clock {
    Clock {
      look_ahead: 0.1,
      update_interval: 0.03,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
  pub transport: Transport,
  pub clock: Clock,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      transport: Transport::default(),
      clock: Clock::default(),
    }
  }
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}
