/// Shipped default template, embedded so `-H` and first runs never depend on
/// an install location.
pub const DEFAULT_TEMPLATE: &str = include_str!("../defaults/pysarApp_template.txt");

/// File name of the default template inside a work directory.
pub const DEFAULT_TEMPLATE_NAME: &str = "pysarApp_template.txt";
