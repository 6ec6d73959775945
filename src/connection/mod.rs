//! Postgres connection: dial, TLS upgrade, startup and message framing.
use std::io::{BufReader, Read, Write};
use std::net::TcpStream;

use bytes::Bytes;

use crate::{
    buffer::{ReadBuf, WriteBuf},
    error::{protocol, ConfigError, ConnectError, Error, ErrorResponse, ProtocolError, Result},
    ext::FmtExt,
    message::{Backend, Frontend},
    transaction::TransactionStatus,
};

mod config;
mod stream;

pub use config::{parse_map, parse_url};
use config::Values;
use stream::{Socket, Stream};

/// Run-time parameters reported by the backend.
pub(crate) struct SessionParams {
    /// Server version in the same format as `server_version_num`, or 0 if
    /// unavailable.
    pub server_version: i32,
    /// The session `TimeZone` name, if reported.
    pub time_zone: Option<String>,
}

/// A single connection to a Postgres backend.
///
/// The connection is strictly request/response: one statement or query is in
/// flight at a time, and every request drains the stream through
/// `ReadyForQuery` before returning. Callers that share a connection across
/// threads must serialize access themselves.
pub struct Connection {
    reader: BufReader<Stream>,
    namei: u64,
    pub(crate) txn_status: TransactionStatus,
    pub(crate) session: SessionParams,
    /// One-slot buffer for the message peeked after `BindComplete`;
    /// [`recv1`][Connection::recv1] prefers it when set.
    pub(crate) saved_message: Option<(Backend, ReadBuf)>,
    closed: bool,
}

impl Connection {
    /// Open a connection.
    ///
    /// `name` is either a `postgres://` URL or a whitespace separated list
    /// of `key=value` pairs; see [`parse_url`] for the URL shape. Settings
    /// not given there fall back to `PG*` environment variables and then to
    /// the built-in defaults.
    pub fn open(name: &str) -> Result<Connection> {
        let mut o = config::defaults();
        for (k, v) in config::parse_environ(std::env::vars())? {
            o.insert(k, v);
        }

        let name = if name.starts_with("postgres://") {
            config::parse_url(name)?
        } else {
            name.to_string()
        };
        config::parse_opts(&name, &mut o)?;

        // Only UTF-8 works here, but the user has always been allowed to
        // say so explicitly. client_encoding is sent as its own run-time
        // parameter, which overrides anything smuggled in via "options".
        match o.get("client_encoding") {
            Some(enc) if !config::is_utf8(enc) => {
                return Err(ConfigError::ClientEncoding.into());
            }
            _ => {}
        }
        o.insert("client_encoding".into(), "UTF8".into());

        // DateStyle gets the same treatment.
        match o.get("datestyle") {
            Some(style) if style != "ISO, MDY" => {
                return Err(ConfigError::DateStyle(style.clone()).into());
            }
            Some(_) => {}
            None => {
                o.insert("datestyle".into(), "ISO, MDY".into());
            }
        }

        // The last resort for the user name is the operating system.
        if o.get("user").is_none_or(|user| user.is_empty()) {
            let user = config::current_user().ok_or(ConfigError::MissingUser)?;
            o.insert("user".into(), user);
        }

        let socket = dial(&o)?;
        let stream = ssl(socket, &o)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            namei: 0,
            txn_status: TransactionStatus::Idle,
            session: SessionParams { server_version: 0, time_zone: None },
            saved_message: None,
            closed: false,
        };
        conn.startup(&o)?;
        Ok(conn)
    }

    /// The server version as reported at startup, in `server_version_num`
    /// format (90201 for 9.2.1), or 0 when unavailable.
    pub fn server_version(&self) -> i32 {
        self.session.server_version
    }

    /// The session time zone name as reported by the backend.
    pub fn session_time_zone(&self) -> Option<&str> {
        self.session.time_zone.as_deref()
    }

    /// Current transaction status, as of the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.txn_status
    }

    /// Send `Terminate` and close the connection.
    pub fn close(mut self) -> Result<()> {
        self.terminate()
    }

    fn terminate(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let w = self.write_message(Frontend::Terminate);
        self.send(w)
    }

    /// Next server-side statement name.
    pub(crate) fn gname(&mut self) -> String {
        self.namei += 1;
        itoa::Buffer::new().format(self.namei).to_string()
    }

    /// Start a message frame; opening a fresh `Query` clears the deferred
    /// message slot.
    pub(crate) fn write_message(&mut self, t: Frontend) -> WriteBuf {
        if t == Frontend::Query {
            self.saved_message = None;
        }
        WriteBuf::new(t as u8)
    }

    /// Finalize the frame and write it out.
    pub(crate) fn send(&mut self, w: WriteBuf) -> Result<()> {
        let frame = w.finish();
        log::trace!("send: {:?}", frame[..].lossy());
        let stream = self.reader.get_mut();
        stream.write_all(&frame)?;
        stream.flush()?;
        Ok(())
    }

    fn recv_message(&mut self) -> Result<(Backend, ReadBuf)> {
        if let Some((t, r)) = self.saved_message.take() {
            log::trace!("returning deferred message: ({t})");
            return Ok((t, r));
        }

        let mut header = [0u8; 5];
        self.reader.read_exact(&mut header)?;
        let t = Backend::from_u8(header[0])
            .ok_or_else(|| protocol!("unknown message type: {:?}", header[0] as char))?;

        let n = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) - 4;
        let n = usize::try_from(n).map_err(|_| protocol!("invalid message length: {}", n + 4))?;
        let mut body = vec![0u8; n];
        self.reader.read_exact(&mut body)?;
        log::trace!("recv: ({t}) {n} bytes");

        Ok((t, ReadBuf::new(Bytes::from(body))))
    }

    /// Receive a message, unwinding `ErrorResponse` as an error. Only
    /// useful during the startup sequence and statement close, where no
    /// resynchronization is pending.
    pub(crate) fn recv(&mut self) -> Result<(Backend, ReadBuf)> {
        loop {
            let (t, mut r) = self.recv_message()?;
            match t {
                Backend::ErrorResponse => return Err(parse_error(&mut r)?.into()),
                Backend::NoticeResponse => {
                    let notice = parse_error(&mut r)?;
                    log::warn!("{notice}");
                }
                _ => return Ok((t, r)),
            }
        }
    }

    /// Receive the next non-asynchronous message. Notices and notifications
    /// are dropped and `ParameterStatus` is applied as a side effect;
    /// everything else, `ErrorResponse` included, goes to the caller.
    pub(crate) fn recv1(&mut self) -> Result<(Backend, ReadBuf)> {
        loop {
            let (t, mut r) = self.recv_message()?;
            match t {
                Backend::NotificationResponse => {}
                Backend::NoticeResponse => {
                    let notice = parse_error(&mut r)?;
                    log::warn!("{notice}");
                }
                Backend::ParameterStatus => self.process_parameter_status(&mut r)?,
                _ => return Ok((t, r)),
            }
        }
    }

    /// Consume messages up to and including `ReadyForQuery`.
    pub(crate) fn wait_ready(&mut self) -> Result<()> {
        loop {
            let (t, mut r) = self.recv1()?;
            if t == Backend::ReadyForQuery {
                self.process_ready_for_query(&mut r)?;
                return Ok(());
            }
        }
    }

    pub(crate) fn process_ready_for_query(&mut self, r: &mut ReadBuf) -> Result<(), ProtocolError> {
        self.txn_status = TransactionStatus::from_byte(r.byte()?)?;
        Ok(())
    }

    pub(crate) fn process_parameter_status(&mut self, r: &mut ReadBuf) -> Result<(), ProtocolError> {
        let param = r.string()?;
        let value = r.string()?;
        match param.as_str() {
            "server_version" => {
                if let Some(version) = parse_server_version(&value) {
                    self.session.server_version = version;
                }
            }
            "TimeZone" => self.session.time_zone = Some(value),
            _ => log::trace!("unhandled parameter status: {param} = {value}"),
        }
        Ok(())
    }

    fn startup(&mut self, o: &Values) -> Result<()> {
        let mut w = WriteBuf::startup();
        w.int32(196608);
        for (k, v) in o {
            // these settings cannot be run-time parameters
            if matches!(k.as_str(), "password" | "host" | "port" | "sslmode") {
                continue;
            }
            // the protocol wants the database name as "database"
            let k = if k == "dbname" { "database" } else { k.as_str() };
            w.string(k);
            w.string(v);
        }
        w.string("");
        self.send(w)?;

        loop {
            let (t, mut r) = self.recv()?;
            match t {
                Backend::BackendKeyData => {}
                Backend::ParameterStatus => self.process_parameter_status(&mut r)?,
                Backend::Authentication => self.auth(&mut r, o)?,
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    return Ok(());
                }
                t => return Err(protocol!("unknown response for startup: {t:?}").into()),
            }
        }
    }

    fn auth(&mut self, r: &mut ReadBuf, o: &Values) -> Result<()> {
        let get = |key: &str| o.get(key).map(String::as_str).unwrap_or("");
        match r.int32()? {
            0 => Ok(()),
            3 => {
                let mut w = self.write_message(Frontend::Password);
                w.string(get("password"));
                self.send(w)?;
                self.expect_auth_ok()
            }
            5 => {
                let salt = r.take(4)?;
                let mut w = self.write_message(Frontend::Password);
                w.string(&md5_password(get("user"), get("password"), &salt));
                self.send(w)?;
                self.expect_auth_ok()
            }
            code => Err(ConnectError::UnsupportedAuth(code).into()),
        }
    }

    fn expect_auth_ok(&mut self) -> Result<()> {
        let (t, mut r) = self.recv()?;
        if t != Backend::Authentication {
            return Err(protocol!("unexpected password response: ({t})").into());
        }
        if r.int32()? != 0 {
            return Err(protocol!("unexpected authentication response").into());
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            log::error!("close error: {err:#?}");
        }
    }
}

fn dial(o: &Values) -> Result<Socket> {
    let host = o.get("host").map(String::as_str).unwrap_or("localhost");
    let port = o.get("port").map(String::as_str).unwrap_or("5432");
    let port: u16 = port.parse().map_err(|_| ConfigError::InvalidPort(port.into()))?;

    // an absolute path means the server's unix socket directory
    if host.starts_with('/') {
        #[cfg(unix)]
        {
            let path = format!("{host}/.s.PGSQL.{port}");
            let socket = std::os::unix::net::UnixStream::connect(path)?;
            return Ok(Socket::Unix(socket));
        }
        #[cfg(not(unix))]
        return Err(ConnectError::UnixSocketUnsupported.into());
    }

    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true)?;
    Ok(Socket::Tcp(stream))
}

fn ssl(mut socket: Socket, o: &Values) -> Result<Stream> {
    let insecure = match o.get("sslmode").map(String::as_str) {
        None | Some("require") => true,
        Some("verify-full") => false,
        Some("disable") => return Ok(Stream::Plain(socket)),
        Some(mode) => return Err(ConfigError::SslMode(mode.into()).into()),
    };

    let mut w = WriteBuf::startup();
    w.int32(80877103);
    socket.write_all(&w.finish())?;

    let mut answer = [0u8; 1];
    socket.read_exact(&mut answer)?;
    if answer[0] != b'S' {
        return Err(ConnectError::SslNotSupported.into());
    }

    let host = o.get("host").map(String::as_str).unwrap_or("localhost");
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(insecure)
        .danger_accept_invalid_hostnames(insecure)
        .build()?;
    let tls = connector.connect(host, socket).map_err(|err| match err {
        native_tls::HandshakeError::Failure(err) => Error::from(err),
        native_tls::HandshakeError::WouldBlock(_) => {
            Error::from(std::io::Error::from(std::io::ErrorKind::WouldBlock))
        }
    })?;
    Ok(Stream::Tls(Box::new(tls)))
}

/// Parse the fields of an `ErrorResponse` or `NoticeResponse` body.
pub(crate) fn parse_error(r: &mut ReadBuf) -> Result<ErrorResponse, ProtocolError> {
    let mut err = ErrorResponse::default();
    loop {
        let field = r.byte()?;
        if field == 0 {
            break;
        }
        let value = r.string()?;
        match field {
            b'S' => err.severity = value,
            b'C' => err.code = value,
            b'M' => err.message = value,
            b'D' => err.detail = Some(value),
            b'H' => err.hint = Some(value),
            b'P' => err.position = Some(value),
            b'W' => err.where_ = Some(value),
            b'F' => err.file = Some(value),
            b'L' => err.line = Some(value),
            b'R' => err.routine = Some(value),
            // more field types might be added; ignore unrecognized ones
            _ => {}
        }
    }
    Ok(err)
}

/// `MAJOR.MAJOR2.MINOR` into `server_version_num` form.
fn parse_server_version(s: &str) -> Option<i32> {
    let mut parts = s.split('.');
    let major1: i32 = parts.next()?.parse().ok()?;
    let major2: i32 = parts.next()?.parse().ok()?;
    let minor: i32 = parts.next()?.parse().ok()?;
    Some(major1 * 10000 + major2 * 100 + minor)
}

/// Salted MD5 password response:
/// `concat('md5', md5(concat(md5(concat(password, username)), random-salt)))`.
fn md5_password(user: &str, password: &str, salt: &[u8]) -> String {
    let inner = format!("{:x}", md5::compute(format!("{password}{user}")));
    let mut outer = inner.into_bytes();
    outer.extend_from_slice(salt);
    format!("md5{:x}", md5::compute(outer))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_version_num() {
        assert_eq!(parse_server_version("9.2.1"), Some(90201));
        assert_eq!(parse_server_version("8.4.22"), Some(80422));
        assert_eq!(parse_server_version("9.2"), None);
        assert_eq!(parse_server_version("devel"), None);
    }

    #[test]
    fn md5_response() {
        // md5(md5("secretbob") + "salt"), hex-encoded with the md5 prefix
        let inner = format!("{:x}", md5::compute("secretbob"));
        let outer = format!("{:x}", md5::compute(format!("{inner}salt")));
        assert_eq!(md5_password("bob", "secret", b"salt"), format!("md5{outer}"));
    }

    #[test]
    fn error_response_fields() {
        let mut body = Vec::new();
        for (f, v) in [(b'S', "ERROR"), (b'C', "42703"), (b'M', "no such column"), (b'H', "try another")] {
            body.push(f);
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        body.push(0);

        let err = parse_error(&mut ReadBuf::new(Bytes::from(body))).unwrap();
        assert_eq!(err.severity, "ERROR");
        assert_eq!(err.code, "42703");
        assert_eq!(err.message, "no such column");
        assert_eq!(err.hint.as_deref(), Some("try another"));
        assert_eq!(err.detail, None);
        assert_eq!(err.to_string(), "ERROR: no such column (42703)");
    }
}
