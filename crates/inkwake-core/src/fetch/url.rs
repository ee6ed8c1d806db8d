#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UrlError;

/// Borrowed view of an absolute `http`/`https` URL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Url<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
    /// Path plus query, always starting with `/`.
    pub path: &'a str,
}

/// Where the transport should connect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Endpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub tls: bool,
}

impl<'a> Url<'a> {
    pub fn parse(input: &'a str) -> Result<Self, UrlError> {
        let input = input.trim();
        let (scheme, rest) = if let Some(rest) = strip_prefix_ignore_case(input, "https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = strip_prefix_ignore_case(input, "http://") {
            (Scheme::Http, rest)
        } else {
            return Err(UrlError);
        };

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let tail = tail.split('#').next().unwrap_or("");

        if authority.contains('@') {
            return Err(UrlError);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| UrlError)?),
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() || port == 0 || host.contains(char::is_whitespace) {
            return Err(UrlError);
        }

        let path = if tail.is_empty() {
            "/"
        } else if tail.starts_with('/') {
            tail
        } else {
            return Err(UrlError);
        };

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    pub fn endpoint(&self) -> Endpoint<'a> {
        Endpoint {
            host: self.host,
            port: self.port,
            tls: self.scheme == Scheme::Https,
        }
    }

    pub fn uses_default_port(&self) -> bool {
        self.port == self.scheme.default_port()
    }
}

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let head = input.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &input[prefix.len()..])
}
