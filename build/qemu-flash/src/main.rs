// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use qemu_flash::{ImageConfig, Outcome};

#[derive(Debug, Parser)]
#[clap(
    max_term_width = 80,
    about = "packs ESP32 boot binaries into a flash image for QEMU"
)]
enum QemuFlash {
    /// Writes the flash image.  Meant to be run as a post-build step, once
    /// `firmware.bin` has been produced.
    Compose {
        /// Build output directory holding the binaries.
        #[clap(env = "BUILD_DIR", default_value = ".")]
        build_dir: PathBuf,
        /// Path to a layout file, in TOML.  Uses the ESP32 layout if absent.
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Where to write the image, instead of the configured output.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Prints the resolved layout without reading or writing any binaries.
    Layout {
        /// Build output directory holding the binaries.
        #[clap(env = "BUILD_DIR", default_value = ".")]
        build_dir: PathBuf,
        /// Path to a layout file, in TOML.  Uses the ESP32 layout if absent.
        #[clap(short, long)]
        config: Option<PathBuf>,
    },
}

/// Resolves the layout to use: the file given with `--config`, or the
/// built-in ESP32 layout.  `output`, if given, replaces the output path the
/// layout names.
fn load_config(
    build_dir: &Path,
    config: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<ImageConfig> {
    let mut cfg = match config {
        Some(path) => ImageConfig::from_file(path, build_dir)?,
        None => ImageConfig::esp32_qemu(build_dir),
    };
    if let Some(output) = output {
        cfg.output = output;
    }
    Ok(cfg)
}

fn print_layout(cfg: &ImageConfig) {
    println!("{} bytes, erased to {:#04x}", cfg.size, cfg.erase_value);
    for (entry, region) in cfg.regions() {
        println!(
            "  {:<12} {:#010x}..{:#010x}  {}",
            entry.name,
            region.start,
            region.end,
            cfg.source_path(entry).display()
        );
    }
    println!("output: {}", cfg.output.display());
}

fn run(cmd: QemuFlash) -> Result<()> {
    match cmd {
        QemuFlash::Compose {
            build_dir,
            config,
            output,
        } => {
            let cfg = load_config(&build_dir, config.as_deref(), output)?;

            let placements = qemu_flash::compose(&cfg)?;
            let inserted = placements
                .iter()
                .filter(|p| matches!(p.outcome, Outcome::Inserted { .. }))
                .count();
            println!(
                "{}: {} of {} binaries inserted",
                cfg.output.display(),
                inserted,
                placements.len()
            );
        }
        QemuFlash::Layout { build_dir, config } => {
            let cfg = load_config(&build_dir, config.as_deref(), None)?;
            print_layout(&cfg);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stdout)
        .init();

    run(QemuFlash::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn build_dir_of(args: &[&str]) -> PathBuf {
        match QemuFlash::try_parse_from(args).unwrap() {
            QemuFlash::Compose { build_dir, .. }
            | QemuFlash::Layout { build_dir, .. } => build_dir,
        }
    }

    // All environment handling lives in this one test, since the variable is
    // shared by every test thread.
    #[test]
    fn build_dir_sources() {
        std::env::remove_var("BUILD_DIR");
        assert_eq!(build_dir_of(&["qemu-flash", "compose"]), Path::new("."));
        assert_eq!(build_dir_of(&["qemu-flash", "layout"]), Path::new("."));

        std::env::set_var("BUILD_DIR", "/pio/build/esp32");
        assert_eq!(
            build_dir_of(&["qemu-flash", "compose"]),
            Path::new("/pio/build/esp32")
        );
        assert_eq!(
            build_dir_of(&["qemu-flash", "compose", "out"]),
            Path::new("out")
        );
        std::env::remove_var("BUILD_DIR");
    }

    #[test]
    fn compose_options() {
        let cmd = QemuFlash::try_parse_from([
            "qemu-flash",
            "compose",
            "build",
            "-c",
            "flash.toml",
            "--output",
            "img.bin",
        ])
        .unwrap();
        match cmd {
            QemuFlash::Compose {
                build_dir,
                config,
                output,
            } => {
                assert_eq!(build_dir, Path::new("build"));
                assert_eq!(config.as_deref(), Some(Path::new("flash.toml")));
                assert_eq!(output.as_deref(), Some(Path::new("img.bin")));
            }
            other => panic!("parsed as {other:?}"),
        }

        // `layout` never writes, so it takes no output
        assert!(QemuFlash::try_parse_from([
            "qemu-flash",
            "layout",
            "-o",
            "img.bin"
        ])
        .is_err());
    }

    #[test]
    fn output_overrides_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path(), None, None).unwrap();
        assert_eq!(cfg.output, dir.path().join("qemu_flash.bin"));

        let other = dir.path().join("other.bin");
        let cfg = load_config(dir.path(), None, Some(other.clone())).unwrap();
        assert_eq!(cfg.output, other);
        assert_eq!(cfg.input_dir, dir.path());
    }

    #[test]
    fn compose_writes_overridden_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("firmware.bin"), [1u8, 2, 3]).unwrap();
        let other = dir.path().join("other.bin");

        run(QemuFlash::Compose {
            build_dir: dir.path().to_path_buf(),
            config: None,
            output: Some(other.clone()),
        })
        .unwrap();

        let image = fs::read(&other).unwrap();
        assert_eq!(image.len(), qemu_flash::DEFAULT_FLASH_SIZE);
        assert_eq!(&image[0x10000..0x10003], &[1, 2, 3]);
        assert!(!dir.path().join("qemu_flash.bin").exists());
    }

    #[test]
    fn layout_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("firmware.bin"), [0u8; 4]).unwrap();

        run(QemuFlash::Layout {
            build_dir: dir.path().to_path_buf(),
            config: None,
        })
        .unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        names.sort();
        assert_eq!(names, ["firmware.bin"]);
    }
}
