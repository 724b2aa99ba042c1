use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

pub const DEFAULT_SEND_RATE_PER_MINUTE: u64 = 100;
pub const DEFAULT_RATE: f64 = 0.00025;
pub const DEFAULT_MAX_PERCENTILE: f64 = 0.99999;
/// Six hours, in milliseconds
pub const ABSOLUTE_MAX_DELAY: u64 = 6 * 60 * 60 * 1000;

/// Quantile function of the exponential distribution with the given rate
pub fn exp_quantile(rate: f64, p: f64) -> f64 {
    -(1.0 - p).ln() / rate
}

/// Network-wide timing and rate parameters published in every document
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameters {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub send_rate_per_minute: u64,
    pub mu: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub mu_max_delay: u64,
    pub lambda_p: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub lambda_p_max_delay: u64,
    pub lambda_l: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub lambda_l_max_delay: u64,
    pub lambda_d: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub lambda_d_max_delay: u64,
    pub lambda_m: f64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub lambda_m_max_delay: u64,
}

fn default_max_delay(rate: f64) -> u64 {
    exp_quantile(rate, DEFAULT_MAX_PERCENTILE) as u64
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            send_rate_per_minute: DEFAULT_SEND_RATE_PER_MINUTE,
            mu: DEFAULT_RATE,
            mu_max_delay: default_max_delay(DEFAULT_RATE).min(ABSOLUTE_MAX_DELAY),
            lambda_p: DEFAULT_RATE,
            lambda_p_max_delay: default_max_delay(DEFAULT_RATE),
            lambda_l: DEFAULT_RATE,
            lambda_l_max_delay: default_max_delay(DEFAULT_RATE),
            lambda_d: DEFAULT_RATE,
            lambda_d_max_delay: default_max_delay(DEFAULT_RATE),
            lambda_m: DEFAULT_RATE,
            lambda_m_max_delay: default_max_delay(DEFAULT_RATE),
        }
    }
}

impl Parameters {
    /// Replace unset (zero or negative) entries with their defaults
    pub fn fixup(&mut self) {
        let defaults = Parameters::default();
        if self.send_rate_per_minute == 0 {
            self.send_rate_per_minute = defaults.send_rate_per_minute;
        }
        fix_rate(&mut self.mu, defaults.mu);
        fix_delay(&mut self.mu_max_delay, defaults.mu_max_delay);
        fix_rate(&mut self.lambda_p, defaults.lambda_p);
        fix_delay(&mut self.lambda_p_max_delay, defaults.lambda_p_max_delay);
        fix_rate(&mut self.lambda_l, defaults.lambda_l);
        fix_delay(&mut self.lambda_l_max_delay, defaults.lambda_l_max_delay);
        fix_rate(&mut self.lambda_d, defaults.lambda_d);
        fix_delay(&mut self.lambda_d_max_delay, defaults.lambda_d_max_delay);
        fix_rate(&mut self.lambda_m, defaults.lambda_m);
        fix_delay(&mut self.lambda_m_max_delay, defaults.lambda_m_max_delay);
    }
}

fn fix_rate(value: &mut f64, default: f64) {
    if !(*value > 0.0) {
        *value = default;
    }
}

fn fix_delay(value: &mut u64, default: u64) {
    if *value == 0 {
        *value = default;
    }
}
