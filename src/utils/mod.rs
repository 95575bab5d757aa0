pub mod data_uri;
#[cfg(test)]
pub mod test_utils;
pub mod url;
