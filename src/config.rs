use std::{env, str::FromStr};

use crate::{fit::FitStrategy, free_list::InsertPolicy, logging::warn};

pub const ENV_STRATEGY: &str = "RMALLOC_STRATEGY";
pub const ENV_INSERT: &str = "RMALLOC_INSERT";
pub const ENV_SCRIBBLE: &str = "RMALLOC_SCRIBBLE";

/// Byte written over fresh payloads while scribbling is on.
pub const SCRIBBLE_BYTE: u8 = 0xAA;

/// Tunables of an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
  pub strategy: FitStrategy,
  pub insertion: InsertPolicy,
  pub scribble: bool,
}

impl Config {
  pub fn strategy(
    mut self,
    strategy: FitStrategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn insertion(
    mut self,
    insertion: InsertPolicy,
  ) -> Self {
    self.insertion = insertion;
    self
  }

  pub fn scribble(
    mut self,
    scribble: bool,
  ) -> Self {
    self.scribble = scribble;
    self
  }

  /// Defaults overridden by `RMALLOC_STRATEGY`, `RMALLOC_INSERT` and
  /// `RMALLOC_SCRIBBLE`. Values that do not parse are logged and skipped.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  fn from_lookup<F>(lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Config::default();

    if let Some(strategy) = parse_var(&lookup, ENV_STRATEGY) {
      config.strategy = strategy;
    }
    if let Some(insertion) = parse_var(&lookup, ENV_INSERT) {
      config.insertion = insertion;
    }
    if let Some(Switch(scribble)) = parse_var(&lookup, ENV_SCRIBBLE) {
      config.scribble = scribble;
    }

    config
  }
}

fn parse_var<F, T>(
  lookup: &F,
  key: &str,
) -> Option<T>
where
  F: Fn(&str) -> Option<String>,
  T: FromStr,
  T::Err: std::fmt::Display,
{
  let raw = lookup(key)?;
  match raw.parse() {
    Ok(value) => Some(value),
    Err(err) => {
      warn!("ignoring {key}={raw:?}: {err}");
      None
    }
  }
}

struct Switch(bool);

impl FromStr for Switch {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "1" | "true" | "on" | "yes" => Ok(Switch(true)),
      "0" | "false" | "off" | "no" | "" => Ok(Switch(false)),
      other => Err(format!("expected a boolean, got `{other}`")),
    }
  }
}
