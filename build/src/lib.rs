mod crds;

pub use crds::crds_yaml;
