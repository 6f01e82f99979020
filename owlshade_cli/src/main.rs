mod bake;

use bake::BakeArgs;

const HELP: &str = "\
owlshade cli

Usage: owlshade_cli [COMMAND] [OPTIONS]

Commands:
  bake

Options:
  --help  Optional  Display this help message
";

const BAKE_HELP: &str = "\
Initialize the demo pbr materials from a panorama and a set of morph poses

Usage: owlshade_cli bake --panorama /path/to/sky.hdr --pose_template /path/to/owl_{}.obj [OPTIONS]

Options:
  --panorama FILEPATH         Required  Equirectangular hdr panorama used for image based lighting
  --pose_template FILEPATH    Required  Path of the morph pose obj files, with {} in place of the pose index
  --asset_root FOLDERNAME     Optional  Folder that relative panorama and pose paths resolve against
                                        Defaults to the working directory
  --config FILEPATH           Optional  Json file overriding the bake settings
  --dump_folder FOLDERNAME    Optional  Write png previews of every baked texture into this folder
  --preview FILEPATH          Optional  Render one frame of the active material into this png
  --frames VAL                Optional  Number of 40ms updates to run before the preview frame
                                        Defaults to 1
  --verify                    Optional  Compare the baked brdf lut against the cpu reference
  --help                      Optional  Display this help message
";

enum Command {
    Help,
    Bake(BakeArgs),
    BakeHelp,
}

enum ArgParseError {
    Root(String),
    Bake(String),
}

impl Command {
    pub fn from_env() -> Result<Self, ArgParseError> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains("bake") {
            if args.contains("--help") {
                return Ok(Self::BakeHelp);
            }

            return Ok(Self::Bake(BakeArgs {
                panorama: args
                    .value_from_str("--panorama")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                pose_template: args
                    .value_from_str("--pose_template")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                asset_root: args
                    .opt_value_from_str("--asset_root")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                config: args
                    .opt_value_from_str("--config")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                dump_folder: args
                    .opt_value_from_str("--dump_folder")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                preview: args
                    .opt_value_from_str("--preview")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                frames: args
                    .opt_value_from_str("--frames")
                    .map_err(|err| ArgParseError::Bake(format!("{err}")))?,
                verify: args.contains("--verify"),
            }));
        }

        if args.contains("--help") {
            return Ok(Self::Help);
        }

        Err(ArgParseError::Root(String::from("No command specified")))
    }
}

fn main() {
    if !env_var_is_defined("RUST_BACKTRACE") {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    if env_var_is_defined("RUST_LOG") {
        env_logger::init();
    } else {
        env_logger::builder()
            .filter(Some("owlshade"), log::LevelFilter::Info)
            .filter(Some(env!("CARGO_BIN_NAME")), log::LevelFilter::Info)
            .filter(Some("wgpu"), log::LevelFilter::Warn)
            .init();
    }

    match Command::from_env() {
        Ok(Command::Bake(args)) => {
            bake::run(args);
        }
        Ok(Command::Help) => {
            println!("{HELP}");
        }
        Ok(Command::BakeHelp) => {
            println!("{BAKE_HELP}");
        }
        Err(err) => {
            let (err, helpmsg) = match err {
                ArgParseError::Root(err) => (err, HELP),
                ArgParseError::Bake(err) => (err, BAKE_HELP),
            };
            println!("Error: {err}\n\n{helpmsg}");
        }
    };
}

fn env_var_is_defined(var: &str) -> bool {
    match std::env::var(var) {
        Ok(val) => !val.is_empty(),
        Err(_) => false,
    }
}
