pub mod bulk;
pub mod claim;
pub mod compact;
pub mod dep;
pub mod init;
pub mod list;
pub mod location;
pub mod new;
pub mod prune;
pub mod result;
pub mod set;
pub mod show;
