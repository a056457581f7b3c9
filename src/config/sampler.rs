use super::*;

#[derive(Deserialize, Default)]
pub struct Sampler {
    #[serde(default)]
    enabled: Option<bool>,
}

impl Sampler {
    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }
}
