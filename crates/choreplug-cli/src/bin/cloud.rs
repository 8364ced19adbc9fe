use std::ffi::OsString;

use choreplug_core::Variant;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    if let Err(err) = choreplug_core::run(args, Variant::Cloud) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
