//! Stream to destination naming
//!
//! Export containers are named `<stream prefix><table>` (for example
//! `am-securityevent`). The destination is `<destination prefix><table>`.
//! Both prefixes come from configuration.
//!
//! Stripping a common prefix is injective over names that carry it, and the
//! stream directory only ever yields such names, so two streams can never
//! land in the same destination.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationNaming {
    stream_prefix: String,
    destination_prefix: String,
}

impl DestinationNaming {
    pub fn new(stream_prefix: impl Into<String>, destination_prefix: impl Into<String>) -> Self {
        Self {
            stream_prefix: stream_prefix.into(),
            destination_prefix: destination_prefix.into(),
        }
    }

    pub fn stream_prefix(&self) -> &str {
        &self.stream_prefix
    }

    pub fn destination_for(&self, stream: &str) -> String {
        let table = stream.strip_prefix(&self.stream_prefix).unwrap_or(stream);
        format!("{}{}", self.destination_prefix, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_stream_prefix() {
        let naming = DestinationNaming::new("am-", "");
        assert_eq!(naming.destination_for("am-securityevent"), "securityevent");
        assert_eq!(naming.destination_for("am-am-syslog"), "am-syslog");
    }

    #[test]
    fn test_adds_destination_prefix() {
        let naming = DestinationNaming::new("am-", "sentinel-");
        assert_eq!(naming.destination_for("am-syslog"), "sentinel-syslog");
    }

    #[test]
    fn test_distinct_streams_stay_distinct() {
        let naming = DestinationNaming::new("am-", "x-");
        let streams = ["am-a", "am-b", "am-am-a", "am-a-b", "am-ab"];
        let mut destinations: Vec<_> = streams.iter().map(|s| naming.destination_for(s)).collect();
        destinations.sort();
        destinations.dedup();
        assert_eq!(destinations.len(), streams.len());
    }
}
