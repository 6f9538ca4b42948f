pub(crate) mod distribution;
pub(crate) mod gradle_home;
