//! Read-only views over the plain repository, plus raw git escapes.

use crate::config::Settings;
use crate::encrepo::EncRepo;
use crate::error::Result;
use crate::plain::PlainRepo;

/// Forward a porcelain subcommand (diff, log, status, ls-files) to P.
pub fn passthrough_plain(settings: &Settings, sub: &str, args: &[String]) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let mut full = vec![sub.to_owned()];
    full.extend_from_slice(args);
    plain.git().run_interactive(full)
}

/// Raw git against the plain repository.
pub fn git_raw(settings: &Settings, args: &[String]) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    plain.git().run_interactive(args)
}

/// Raw git against the encrypted repository.
pub fn git_enc_raw(settings: &Settings, args: &[String]) -> Result<()> {
    let enc = EncRepo::open(settings)?;
    enc.git().run_interactive(args)
}

/// The biggest tracked files at HEAD, largest first.
pub fn largest(settings: &Settings) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let out = plain
        .git()
        .run(["ls-tree", "-r", "-l", "--full-tree", "HEAD"])?;
    let mut sized: Vec<(u64, String)> = Vec::new();
    for line in out.lines() {
        // <mode> <type> <oid> <size>\t<path>
        let Some((meta, path)) = line.split_once('\t') else {
            continue;
        };
        let Some(size) = meta.split_whitespace().nth(3) else {
            continue;
        };
        if let Ok(size) = size.parse::<u64>() {
            sized.push((size, path.to_owned()));
        }
    }
    sized.sort_by(|a, b| b.0.cmp(&a.0));
    for (size, path) in sized.into_iter().take(20) {
        println!("{size:>12} {path}");
    }
    Ok(())
}
