use crate::config::Settings;
use crate::encrepo::EncRepo;
use crate::error::Result;
use crate::plain::PlainRepo;

/// Create the plain and encrypted repositories next to the working tree.
pub fn init(settings: &Settings) -> Result<()> {
    let plain = PlainRepo::init(settings)?;
    let enc = EncRepo::init(settings)?;
    println!(
        "Initialized backup of {} in {}",
        plain.work_tree().display(),
        plain.git_dir().display()
    );
    println!("Encrypted repository at {}", enc.dir().display());
    println!("Next: add PATH..., then commit");
    Ok(())
}
