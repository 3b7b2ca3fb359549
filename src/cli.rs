use std::path::PathBuf;

use clap::{crate_version, App, Arg};
use failure::{format_err, Error};
use log::debug;

use crate::archive::pack;
use crate::bundle::Bundle;
use crate::merge::{MergeConfig, Overlay};
use crate::overrides::{is_plain_name, parse_rule, OverrideTable};

pub fn main() -> Result<(), Error> {
    let app = App::new("appzip")
        .version(crate_version!())
        .about("Packs a macOS .app bundle and its build output into a zip archive")
        .arg(
            Arg::with_name("bundle")
                .index(1)
                .required(true)
                .value_name("BUNDLE")
                .help("The .app bundle skeleton"),
        )
        .arg(
            Arg::with_name("build_dir")
                .index(2)
                .required(true)
                .value_name("BUILD_DIR")
                .help("The build output holding the executable"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("PATH")
                .help("Where to write the archive [default: <bundle name>.zip]"),
        )
        .arg(
            Arg::with_name("executable")
                .short("e")
                .long("executable")
                .takes_value(true)
                .value_name("NAME")
                .help("Executable file name in BUILD_DIR [default: <bundle name>]"),
        )
        .arg(
            Arg::with_name("final_name")
                .short("n")
                .long("final-name")
                .takes_value(true)
                .value_name("NAME")
                .help("Executable name inside Contents/MacOS [default: same as --executable]"),
        )
        .arg(
            Arg::with_name("rename")
                .short("r")
                .long("rename")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("FROM=TO")
                .help("Renames a build output file inside the archive"),
        );
    let matches = app.get_matches();

    let mut rules = vec![];
    for rule in matches.values_of("rename").into_iter().flatten() {
        let rule = parse_rule(rule).ok_or_else(|| format_err!("invalid rename rule '{}'", rule))?;
        rules.push(rule);
    }

    let bundle = Bundle::open(matches.value_of("bundle").unwrap())?;
    let executable = matches
        .value_of("executable")
        .unwrap_or_else(|| bundle.stem())
        .to_string();
    let final_name = matches
        .value_of("final_name")
        .unwrap_or(executable.as_str())
        .to_string();
    if !is_plain_name(&final_name) {
        return Err(format_err!("invalid final name '{}'", final_name));
    }
    let overlay = Overlay::open(matches.value_of("build_dir").unwrap(), &executable)?;

    debug!(
        "merging {} into {}",
        overlay.root().display(),
        bundle.name()
    );

    let mut config = MergeConfig::new(executable);
    config.overrides = OverrideTable::for_executable(&config.executable, &final_name);
    config.overrides.extend(rules);
    config.final_name = final_name;
    for (from, to) in config.overrides.iter() {
        debug!("override {} -> {}", from, to);
    }

    let dst = matches
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| bundle.default_output());

    let path = pack(&bundle, &overlay, &config, &dst)?;
    println!("Created {}", path.display());

    Ok(())
}
