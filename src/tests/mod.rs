#[cfg(test)]
mod scenarios;
