//! Codec tests: varints, tagged values, versioned containers

mod value_tests;
