use serde::{Serialize, Deserialize};

/// An ordered list of STUN server locations (`host:port`), tried front to back.
///
/// Names are kept unresolved; they are looked up again on every probe.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerList {
    servers: Vec<String>
}

impl ServerList {
    pub fn new() -> Self {
        Self {
            servers: Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn add(&mut self, server: impl Into<String>) {
        self.servers.push(server.into());
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.servers.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(String::as_str)
    }
}

impl<S: Into<String>> std::iter::FromIterator<S> for ServerList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            servers: iter.into_iter().map(Into::into).collect()
        }
    }
}
