use shelfsnap::registry::StaticRegistry;

use super::cli::RegistryArgs;

pub fn build_registry(args: &RegistryArgs) -> StaticRegistry {
    let mut reg = StaticRegistry::with_default_trackers(args.primary_source);
    for &s in &args.sources {
        reg = reg.with_source(s);
    }
    for &t in &args.logged_in {
        reg = reg.with_login(t);
    }
    reg
}
