pub(crate) mod builder;
pub(crate) mod hilbert;
pub(crate) mod layout;
pub(crate) mod node;
pub(crate) mod search;
