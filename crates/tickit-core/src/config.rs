use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const RC_ENV_VAR: &str = "TICKITRC";

/// Environment variables consulted, in
/// order, when `advisor.api_key` is not
/// set.
pub const API_KEY_ENV_VARS: [&str; 2] =
  ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      ("data.location", "~/.tickit"),
      ("color", "on"),
      ("default.sort", "created-desc"),
      ("celebration.seconds", "5"),
      (
        "advisor.model",
        crate::gemini::DEFAULT_MODEL
      ),
      (
        "advisor.endpoint",
        crate::gemini::DEFAULT_ENDPOINT
      )
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();
    Self { map }
  }
}

/// One meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine {
  Setting(String, String),
  Include(PathBuf)
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        cfg.load_file(&path, 0)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `on/off`, `yes/no`, `true/false`
  /// or `1/0`; anything else is an
  /// error.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    parse_bool(raw).map(Some).ok_or_else(
      || {
        anyhow!(
          "config key {key} expects \
           on or off, got {raw:?}"
        )
      }
    )
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Ok(None);
    }
    trimmed
      .parse::<u64>()
      .map(Some)
      .with_context(|| {
        format!(
          "config key {key} expects \
           a whole number, got \
           {raw:?}"
        )
      })
  }

  /// The advisor credential, if any.
  /// Blank values count as unset.
  pub fn api_key(
    &self
  ) -> Option<String> {
    let from_file = self
      .get("advisor.api_key")
      .map(|k| k.trim().to_string())
      .filter(|k| !k.is_empty());
    if from_file.is_some() {
      return from_file;
    }

    API_KEY_ENV_VARS.iter().find_map(
      |name| {
        std::env::var(name)
          .ok()
          .map(|k| k.trim().to_string())
          .filter(|k| !k.is_empty())
      }
    )
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      return Err(anyhow!(
        "includes nested deeper than \
         {MAX_INCLUDE_DEPTH} at {}",
        path.display()
      ));
    }

    let text = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let base_dir = path
      .parent()
      .unwrap_or(Path::new("."));

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw_line)
        .with_context(|| {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        })?;

      match parsed {
        | None => {}
        | Some(RcLine::Setting(key, value)) => {
          trace!(key = %key, "loaded config key");
          self.map.insert(key, value);
        }
        | Some(RcLine::Include(target)) => {
          let target = if target.is_absolute() {
            target
          } else {
            base_dir.join(target)
          };
          if target.exists() {
            self.load_file(&target, depth + 1)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
      }
    }

    Ok(())
  }
}

const MAX_INCLUDE_DEPTH: usize = 8;

/// Blank lines and comments yield
/// `None`; a trailing `# ...` is
/// dropped from settings.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(rest) =
    line.strip_prefix("include ")
  {
    let rest = rest.trim();
    if rest.is_empty() {
      return Err(anyhow!(
        "include path cannot be empty"
      ));
    }
    return Ok(Some(RcLine::Include(
      expand_tilde(Path::new(rest))
    )));
  }

  let (k, v) =
    line.split_once('=').ok_or_else(
      || {
        anyhow!(
          "expected key=value, got \
           {raw:?}"
        )
      }
    )?;
  Ok(Some(RcLine::Setting(
    k.trim().to_string(),
    v.trim().to_string()
  )))
}

/// `--data` wins, then `data.location`,
/// then `~/.tickit`. The directory is
/// created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(location)) => {
      expand_tilde(Path::new(&location))
    }
    | (None, None) => dirs::home_dir()
      .map(|home| home.join(".tickit"))
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory"
        )
      })?
  };

  fs::create_dir_all(&dir)
    .with_context(|| {
      format!(
        "failed to create {}",
        dir.display()
      )
    })?;
  debug!(dir = %dir.display(), "data directory ready");
  Ok(dir)
}

/// `--config`, then `$TICKITRC`
/// (`/dev/null` disables), then an
/// existing `~/.tickitrc`.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  dirs::home_dir()
    .map(|home| home.join(".tickitrc"))
    .filter(|candidate| {
      candidate.exists()
    })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use std::path::PathBuf;

  use super::{
    Config,
    RcLine,
    parse_rc_line
  };

  #[test]
  fn rc_file_with_comments_and_include()
  {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &extra,
      "advisor.model = \
       gemini-test\n"
    )
    .expect("write include");
    let main =
      temp.path().join("main.rc");
    fs::write(
      &main,
      "# tickit settings\n\
       color=off   # no ansi\n\
       celebration.seconds = 9\n\
       include extra.rc\n\
       include missing.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load rc");
    assert_eq!(
      cfg
        .get_bool("color")
        .expect("bool"),
      Some(false)
    );
    assert_eq!(
      cfg
        .get_u64("celebration.seconds")
        .expect("number"),
      Some(9)
    );
    assert_eq!(
      cfg.get("advisor.model").as_deref(),
      Some("gemini-test")
    );
  }

  #[test]
  fn rejects_line_without_equals() {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "rc.advisor.api_key".to_string(),
        "secret".to_string()
      ),
      (
        "default.sort".to_string(),
        "due-asc".to_string()
      ),
    ]);
    assert_eq!(
      cfg.api_key().as_deref(),
      Some("secret")
    );
    assert_eq!(
      cfg.get("default.sort").as_deref(),
      Some("due-asc")
    );
  }

  #[test]
  fn non_numeric_value_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "celebration.seconds".to_string(),
      "soon".to_string()
    )]);
    assert!(
      cfg
        .get_u64("celebration.seconds")
        .is_err()
    );
  }

  #[test]
  fn rc_lines_parse_settings_comments_and_includes()
  {
    assert_eq!(
      parse_rc_line("  # note")
        .expect("comment"),
      None
    );
    assert_eq!(
      parse_rc_line("color = off # x")
        .expect("setting"),
      Some(RcLine::Setting(
        "color".to_string(),
        "off".to_string()
      ))
    );
    assert_eq!(
      parse_rc_line("include extra.rc")
        .expect("include"),
      Some(RcLine::Include(
        PathBuf::from("extra.rc")
      ))
    );
    assert!(
      parse_rc_line("include   ").is_err()
    );
  }

  #[test]
  fn self_include_is_rejected() {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let rc = temp.path().join("loop.rc");
    fs::write(&rc, "include loop.rc\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&rc)).is_err()
    );
  }

  #[test]
  fn color_must_be_a_switch() {
    let mut cfg = Config::default();
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(true)
    );
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
  }
}
