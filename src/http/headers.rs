//! Response header table.
//!
//! Names are folded to lower case on every access. Ordinary headers are
//! last-write-wins; `set-cookie` is append-only, so every value written to it
//! is kept and emitted as its own header line.

const SET_COOKIE: &str = "set-cookie";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
    cookies: Vec<String>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value (`set-cookie` accumulates).
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();

        if name == SET_COOKIE {
            self.cookies.push(value);
            return;
        }

        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Appends to a header using `", "` joining, or sets it when absent.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();

        if name == SET_COOKIE {
            self.cookies.push(value);
            return;
        }

        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => {
                entry.1.push_str(", ");
                entry.1.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Removes a header; absent names are ignored.
    pub fn remove(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        if name == SET_COOKIE {
            self.cookies.clear();
        } else {
            self.entries.retain(|(k, _)| *k != name);
        }
    }

    /// Returns the value of a header. For `set-cookie` this is the first value.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        if name == SET_COOKIE {
            return self.cookies.first().map(String::as_str);
        }
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value stored under `name`.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let name = name.to_ascii_lowercase();
        if name == SET_COOKIE {
            return self.cookies.iter().map(String::as_str).collect();
        }
        self.get(&name).into_iter().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of header lines the table serializes to.
    pub fn len(&self) -> usize {
        self.entries.len() + self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over header lines in insertion order, `set-cookie` last.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(self.cookies.iter().map(|v| (SET_COOKIE, v.as_str())))
    }
}

impl<K: AsRef<str>, V: Into<String>> Extend<(K, V)> for HeaderTable {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k.as_ref(), v);
        }
    }
}
