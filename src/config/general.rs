use super::*;

#[derive(Deserialize)]
pub struct General {
    #[serde(default = "listen")]
    listen: String,

    // wall-clock period between sampling passes
    #[serde(default = "interval")]
    interval: String,

    // directory where the capture loader pins its counter maps
    #[serde(default = "bpf_pin_path")]
    bpf_pin_path: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            listen: listen(),
            interval: interval(),
            bpf_pin_path: bpf_pin_path(),
        }
    }
}

impl General {
    pub fn check(&self) {
        match self.interval.parse::<humantime::Duration>() {
            Err(e) => {
                eprintln!("interval couldn't be parsed: {e}");
                std::process::exit(1);
            }
            Ok(interval) => {
                if *interval < std::time::Duration::from_millis(1) {
                    eprintln!("interval is too short. Minimum interval is: 1ms");
                    std::process::exit(1);
                }
            }
        }
    }

    pub fn listen(&self) -> SocketAddr {
        self.listen
            .to_socket_addrs()
            .map_err(|e| {
                eprintln!("bad listen address: {e}");
                std::process::exit(1);
            })
            .unwrap()
            .next()
            .ok_or_else(|| {
                eprintln!("could not resolve socket addr");
                std::process::exit(1);
            })
            .unwrap()
    }

    pub fn interval(&self) -> std::time::Duration {
        *self.interval.parse::<humantime::Duration>().unwrap()
    }

    pub fn bpf_pin_path(&self) -> &str {
        &self.bpf_pin_path
    }
}
