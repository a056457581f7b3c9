use crate::debug;

use ringlog::Level;
use serde::Deserialize;

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

mod general;
mod log;
mod sampler;

use general::General;
use log::Log;
use sampler::Sampler as SamplerConfig;

fn enabled() -> bool {
    true
}

fn listen() -> String {
    "0.0.0.0:8080".into()
}

fn interval() -> String {
    "5s".into()
}

fn bpf_pin_path() -> String {
    "/sys/fs/bpf/nodepulse".into()
}

#[derive(Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    log: Log,
    #[serde(default)]
    samplers: HashMap<String, SamplerConfig>,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| {
                eprintln!("unable to open config file: {e}");
                std::process::exit(1);
            })
            .unwrap();

        let config: Config = toml::from_str(&content)
            .map_err(|e| {
                eprintln!("failed to parse config file: {e}");
                std::process::exit(1);
            })
            .unwrap();

        config.general.check();

        Ok(config)
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn enabled(&self, name: &str) -> bool {
        let enabled = self
            .samplers
            .get(name)
            .and_then(|v| v.enabled())
            .unwrap_or(enabled());

        if enabled {
            debug!("'{name}' sampler is enabled");
        } else {
            debug!("'{name}' sampler is not enabled");
        }

        enabled
    }
}
