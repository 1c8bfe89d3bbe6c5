use log::info;

use super::{Error, Result, kernel::SetKernel, rules::backup_name};

/// Swap the live and backup generations of `set`
///
/// Swapping is self-inverse, so a second rollback restores the state
/// before the first one. Must not run while `set` is being updated.
pub fn rollback<K: SetKernel + ?Sized>(kernel: &K, set: &str) -> Result<()> {
    let backup = backup_name(set);
    if !kernel
        .set_exists(&backup)
        .map_err(|e| Error::kernel("list_sets", &backup, e))?
    {
        return Err(Error::BackupMissing(backup));
    }
    kernel
        .swap_sets(set, &backup)
        .map_err(|e| Error::kernel("swap_sets", format!("{} {}", set, backup), e))?;
    info!("ROLLBACK SET [{}] <-> [{}]", set, backup);
    Ok(())
}
