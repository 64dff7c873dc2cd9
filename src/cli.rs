//! Command line interface of `camctl`, based on clap.
//!
//! [`Cli`] holds the global flags (`--verbose`, `--config`) and one
//! [`Command`] per demonstration of the control plane.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use camctl::angles::Facing;
use camctl::geometry::Size;

/// camctl: drives a simulated camera through its control plane.
#[derive(Debug, Parser)]
#[command(name = "camctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FacingArg {
    Front,
    Back,
}

impl From<FacingArg> for Facing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::Front => Facing::Front,
            FacingArg::Back => Facing::Back,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts the simulated camera, locks 3A, meters a point and stops.
    Demo {
        /// Frames the simulated sensor needs to converge.
        #[arg(long, default_value_t = 4)]
        settle_frames: u32,
    },

    /// Prints the rotation between every pair of reference frames.
    Offsets {
        #[arg(long, value_enum, default_value = "back")]
        facing: FacingArg,

        /// Sensor mounting rotation, in degrees.
        #[arg(long, default_value_t = 90)]
        sensor: i32,

        /// Display rotation, in degrees.
        #[arg(long, default_value_t = 0)]
        display: i32,

        /// Device orientation, in degrees.
        #[arg(long, default_value_t = 0)]
        orientation: i32,
    },

    /// Maps a touch on the preview into hardware metering rectangles.
    Meter {
        /// Touch position, horizontally, in view pixels.
        x: f32,

        /// Touch position, vertically, in view pixels.
        y: f32,

        /// Preview surface size, as WIDTHxHEIGHT.
        #[arg(long, default_value = "1080x1920", value_parser = parse_size)]
        surface: Size,

        /// Sensor stream size, as WIDTHxHEIGHT.
        #[arg(long, default_value = "1920x1080", value_parser = parse_size)]
        stream: Size,

        /// Sensor mounting rotation, in degrees.
        #[arg(long, default_value_t = 90)]
        sensor: i32,

        /// Maximum number of regions to keep.
        #[arg(long, default_value_t = 2)]
        max_regions: usize,

        /// Prints the regions as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Parses `WIDTHxHEIGHT`, e.g. `1920x1080`.
pub fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid dimension {part:?}: {err}"))
    };
    Ok(Size::new(parse(width)?, parse(height)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_offsets_subcommand() {
        let cli = Cli::parse_from(["camctl", "offsets", "--facing", "front", "--sensor", "270"]);
        match cli.command {
            Command::Offsets {
                facing,
                sensor,
                display,
                orientation,
            } => {
                assert!(matches!(facing, FacingArg::Front));
                assert_eq!(sensor, 270);
                assert_eq!(display, 0);
                assert_eq!(orientation, 0);
            }
            _ => panic!("expected Offsets command"),
        }
    }

    #[test]
    fn cli_parses_meter_subcommand() {
        let cli = Cli::parse_from(["camctl", "meter", "540", "960", "--json"]);
        match cli.command {
            Command::Meter {
                x, y, surface, json, max_regions, ..
            } => {
                assert_eq!((x, y), (540.0, 960.0));
                assert_eq!(surface, Size::new(1080, 1920));
                assert_eq!(max_regions, 2);
                assert!(json);
            }
            _ => panic!("expected Meter command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["camctl", "--config", "cam.toml", "--verbose", "demo"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("cam.toml")));
        assert!(matches!(cli.command, Command::Demo { settle_frames: 4 }));
    }

    #[test]
    fn sizes_are_parsed() {
        assert_eq!(parse_size("640x480"), Ok(Size::new(640, 480)));
        assert_eq!(parse_size("1280X720"), Ok(Size::new(1280, 720)));
        assert!(parse_size("640").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
