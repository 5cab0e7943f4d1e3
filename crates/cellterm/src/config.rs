// SPDX-License-Identifier: MIT
//
// Per-session rendering properties.
//
// Properties arrive as plain `key = value` strings from whatever the host
// application reads its settings from; loading them is the host's job.
// Each value is validated as it is set so a bad setting is reported with
// its key and never reaches the renderer.
//
// Keys:
//
//   palette-size         power of two in 2..=2048        (128)
//   fast-quantize        bool, uniform color cube         (false)
//   base-palette         "vt340" | "cga" | "none"         (none)
//   shared-palette       bool                             (false)
//   suppress-palette     bool                             (false)
//   transparency         bool                             (false)
//   dither               bool                             (false)
//   truecolor            bool, else downgrade to 16       (true)
//   bright-colors        bool, AIXterm 90–97 for bold     (true)
//   sixel                bool, send image cells as sixel  (true)
//   washout-correction   bool                             (true)
//   abort-on-disconnect  bool, multi-target only          (false)

use cellterm_sixel::{BasePalette, EncoderOptions, PaletteSize, SixelError};
use thiserror::Error;

/// A rejected property.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown session property {0:?}")]
    UnknownKey(String),

    #[error("{key}: expected a boolean, got {value:?}")]
    InvalidBool { key: String, value: String },

    #[error("{key}: expected a number, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key}: {source}")]
    Sixel {
        key: String,
        #[source]
        source: SixelError,
    },
}

// ─── SessionProperties ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)] // One switch per session property.
pub struct SessionProperties {
    pub palette_size: PaletteSize,
    pub fast_quantize: bool,
    pub base_palette: Option<BasePalette>,
    pub shared_palette: bool,
    pub suppress_palette: bool,
    pub transparency: bool,
    pub dither: bool,
    pub truecolor: bool,
    pub bright_colors: bool,
    pub sixel: bool,
    pub washout_correction: bool,
    pub abort_on_disconnect: bool,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self {
            palette_size: PaletteSize::default(),
            fast_quantize: false,
            base_palette: None,
            shared_palette: false,
            suppress_palette: false,
            transparency: false,
            dither: false,
            truecolor: true,
            bright_colors: true,
            sixel: true,
            washout_correction: true,
            abort_on_disconnect: false,
        }
    }
}

impl SessionProperties {
    /// Defaults with `pairs` applied in order.
    ///
    /// ```
    /// use cellterm::config::SessionProperties;
    ///
    /// let props = SessionProperties::from_pairs([("palette-size", "16"), ("dither", "on")]).unwrap();
    /// assert_eq!(props.palette_size.get(), 16);
    /// assert!(props.dither);
    /// assert!(SessionProperties::from_pairs([("palette-size", "100")]).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut props = Self::default();
        for (key, value) in pairs {
            props.set(key.as_ref(), value.as_ref())?;
        }
        Ok(props)
    }

    /// Set one property from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown keys and unparseable or
    /// out-of-range values. The properties are unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        let value = value.trim();
        match key {
            "palette-size" => {
                let n: usize = value.parse().map_err(|_| ConfigError::InvalidNumber {
                    key: key.to_owned(),
                    value: value.to_owned(),
                })?;
                self.palette_size = PaletteSize::new(n).map_err(|source| ConfigError::Sixel {
                    key: key.to_owned(),
                    source,
                })?;
            }
            "base-palette" => {
                self.base_palette = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse().map_err(|source| ConfigError::Sixel {
                        key: key.to_owned(),
                        source,
                    })?)
                };
            }
            "fast-quantize" => self.fast_quantize = parse_bool(key, value)?,
            "shared-palette" => self.shared_palette = parse_bool(key, value)?,
            "suppress-palette" => self.suppress_palette = parse_bool(key, value)?,
            "transparency" => self.transparency = parse_bool(key, value)?,
            "dither" => self.dither = parse_bool(key, value)?,
            "truecolor" => self.truecolor = parse_bool(key, value)?,
            "bright-colors" => self.bright_colors = parse_bool(key, value)?,
            "sixel" => self.sixel = parse_bool(key, value)?,
            "washout-correction" => self.washout_correction = parse_bool(key, value)?,
            "abort-on-disconnect" => self.abort_on_disconnect = parse_bool(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_owned())),
        }
        Ok(())
    }

    /// Sixel encoder settings these properties describe.
    #[must_use]
    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            palette_size: self.palette_size,
            transparency: self.transparency,
            fast: self.fast_quantize,
            base_palette: self.base_palette,
            suppress_palette: self.suppress_palette,
            dither: self.dither,
            ..EncoderOptions::default()
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
