//! Prepared statements, row streaming and command results.
use crate::{
    buffer::ReadBuf,
    connection::{parse_error, Connection},
    encode,
    error::{protocol, EncodeError, Error, ProtocolError, Result},
    message::{Backend, Frontend},
    oid::{self, Oid},
    value::Value,
};

/// What the driver knows about a parsed statement: its server-side name,
/// the result shape from `RowDescription` and the parameter types from
/// `ParameterDescription`.
pub(crate) struct StmtData {
    pub name: String,
    pub query: String,
    pub cols: Vec<String>,
    pub row_typs: Vec<Oid>,
    pub param_typs: Vec<Oid>,
    /// One decoded row retained by execute, for `RETURNING` extraction.
    pub row_data: Option<Vec<Value>>,
}

impl StmtData {
    fn new(name: String, query: &str) -> Self {
        Self {
            name,
            query: query.to_string(),
            cols: Vec::new(),
            row_typs: Vec::new(),
            param_typs: Vec::new(),
            row_data: None,
        }
    }

    fn parse_row_description(&mut self, r: &mut ReadBuf) -> Result<(), ProtocolError> {
        let n = r.int16()?.max(0);
        self.cols = Vec::with_capacity(n as usize);
        self.row_typs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            self.cols.push(r.string()?);
            // table oid and attribute number
            r.take(6)?;
            self.row_typs.push(r.oid()?);
            // type size, modifier and format code
            r.take(8)?;
        }
        Ok(())
    }
}

/// Decode one `DataRow` body against the statement's column types.
fn parse_data_row(r: &mut ReadBuf, row_typs: &[Oid]) -> Result<Vec<Value>> {
    let n = r.int16()?.max(0);
    let mut row = Vec::with_capacity(n as usize);
    for i in 0..n as usize {
        let len = r.int32()?;
        if len == -1 {
            row.push(Value::Null);
            continue;
        }
        let bytes = r.take(len.max(0) as usize)?;
        let typ = row_typs.get(i).copied().unwrap_or(oid::UNKNOWN);
        row.push(encode::decode(&bytes, typ)?);
    }
    Ok(row)
}

/// Parse the command tag of a `CommandComplete` message into the number of
/// rows affected (where applicable) and the bare command word, e.g.
/// `"INSERT 0 3"` into `(3, "INSERT")` and `"ALTER TABLE"` into
/// `(0, "ALTER TABLE")`.
pub(crate) fn parse_complete(tag: &str) -> Result<(i64, String), ProtocolError> {
    const COMMANDS_WITH_AFFECTED_ROWS: [&str; 6] =
        ["SELECT ", "UPDATE ", "DELETE ", "FETCH ", "MOVE ", "COPY "];

    let mut affected = None;
    let mut command = tag;
    for prefix in COMMANDS_WITH_AFFECTED_ROWS {
        if let Some(rest) = tag.strip_prefix(prefix) {
            affected = Some(rest);
            command = &prefix[..prefix.len() - 1];
            break;
        }
    }

    // INSERT also includes the oid of the inserted row in its tag. Oids in
    // user tables are deprecated, so only the trailing row count is kept.
    if affected.is_none() && tag.starts_with("INSERT ") {
        let parts: Vec<&str> = tag.split(' ').collect();
        if parts.len() != 3 {
            return Err(protocol!("unexpected INSERT command tag {tag}"));
        }
        affected = Some(parts[2]);
        command = "INSERT";
    }

    // no affected rows attached to the tag
    let Some(affected) = affected else {
        return Ok((0, command.to_string()));
    };

    let n = affected
        .parse()
        .map_err(|err| protocol!("could not parse commandTag: {err}"))?;
    Ok((n, command.to_string()))
}

/// Rows affected and the best-effort last-insert id of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: i64,
    last_insert_id: Option<i64>,
}

impl ExecResult {
    fn new(rows_affected: i64, row_data: Option<&[Value]>) -> Self {
        // take the first integer of the retained row as the id
        let last_insert_id = row_data.and_then(|row| {
            row.iter().find_map(|v| match v {
                Value::Int(n) => Some(*n),
                _ => None,
            })
        });
        Self { rows_affected, last_insert_id }
    }

    /// Number of rows the command affected.
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// Postgres has no real last-insert id; this is the first integer
    /// column observed in the first result row, intended to capture
    /// `INSERT ... RETURNING id`. Best effort.
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

impl Connection {
    /// Parse and describe a statement under a server-generated name.
    pub fn prepare(&mut self, query: &str) -> Result<Statement<'_>> {
        let name = self.gname();
        let data = self.prepare_data(query, name)?;
        Ok(Statement { conn: self, data, closed: false })
    }

    /// Run a simple query and stream its rows.
    pub fn query(&mut self, query: &str) -> Result<Rows<'_>> {
        self.simple_query(query)
    }

    /// One-shot execution.
    ///
    /// Without parameters this is a single `Query` round-trip. With
    /// parameters the unnamed statement is used, deferring planning to bind
    /// time where value-based selectivity estimates are available.
    pub fn execute(&mut self, query: &str, params: &[Value]) -> Result<ExecResult> {
        if params.is_empty() {
            let (res, _) = self.simple_exec(query)?;
            return Ok(res);
        }

        let mut data = self.prepare_data(query, String::new())?;
        self.exec_bind(&data, params)?;
        self.exec_drain(&mut data)
    }

    /// `Query` round-trip keeping the result, for execute-style callers.
    pub(crate) fn simple_exec(&mut self, query: &str) -> Result<(ExecResult, String)> {
        let mut data = StmtData::new(String::new(), query);

        let mut w = self.write_message(Frontend::Query);
        w.string(query);
        self.send(w)?;

        let mut res = None;
        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::CommandComplete => {
                    let (rows_affected, tag) = parse_complete(&r.string()?)?;
                    res = Some((ExecResult::new(rows_affected, data.row_data.as_deref()), tag));
                }
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    if let Some(err) = err {
                        return Err(err);
                    }
                    return res.ok_or_else(|| protocol!("simple query produced no result").into());
                }
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::RowDescription => data.parse_row_description(&mut r)?,
                Backend::DataRow => {
                    // only the first row is retained, for RETURNING extraction
                    if data.row_data.is_none() {
                        data.row_data = Some(parse_data_row(&mut r, &data.row_typs)?);
                    }
                }
                t => return Err(protocol!("unknown response for simple query: ({t})").into()),
            }
        }
    }

    /// `Query` round-trip streaming rows out as soon as the result shape is
    /// known.
    pub(crate) fn simple_query(&mut self, query: &str) -> Result<Rows<'_>> {
        let mut data = StmtData::new(String::new(), query);

        let mut w = self.write_message(Frontend::Query);
        w.string(query);
        self.send(w)?;

        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::CommandComplete => {
                    // a query without a result set still hands back a
                    // cursor the caller can close
                    if err.is_some() {
                        return Err(
                            protocol!("unexpected CommandComplete in simple query execution").into()
                        );
                    }
                }
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    return match err {
                        Some(err) => Err(err),
                        None => Ok(Rows::done(self)),
                    };
                }
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::RowDescription => {
                    data.parse_row_description(&mut r)?;
                    // kick out to the cursor now that the shape is known
                    return Ok(Rows::streaming(self, data));
                }
                t => return Err(protocol!("unknown response for simple query: ({t})").into()),
            }
        }
    }

    /// `Parse` + `Describe` + `Sync`, capturing the statement's shape.
    pub(crate) fn prepare_data(&mut self, query: &str, name: String) -> Result<StmtData> {
        let mut data = StmtData::new(name, query);

        let mut w = self.write_message(Frontend::Parse);
        w.string(&data.name);
        w.string(query);
        w.int16(0);
        self.send(w)?;

        let mut w = self.write_message(Frontend::Describe);
        w.byte(b'S');
        w.string(&data.name);
        self.send(w)?;

        let w = self.write_message(Frontend::Sync);
        self.send(w)?;

        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::ParseComplete => {}
                Backend::ParameterDescription => {
                    let nparams = r.int16()?.max(0);
                    data.param_typs = Vec::with_capacity(nparams as usize);
                    for _ in 0..nparams {
                        data.param_typs.push(r.oid()?);
                    }
                }
                Backend::RowDescription => data.parse_row_description(&mut r)?,
                Backend::NoData => {}
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    return match err {
                        Some(err) => Err(err),
                        None => Ok(data),
                    };
                }
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                t => return Err(protocol!("unexpected describe response: ({t})").into()),
            }
        }
    }

    /// `Bind` + `Execute` + `Sync`, consuming through `BindComplete` and one
    /// peeked message.
    pub(crate) fn exec_bind(&mut self, data: &StmtData, params: &[Value]) -> Result<()> {
        if params.len() != data.param_typs.len() {
            return Err(EncodeError::ParameterCount {
                got: params.len(),
                want: data.param_typs.len(),
            }
            .into());
        }

        let mut w = self.write_message(Frontend::Bind);
        w.string("");
        w.string(&data.name);
        w.int16(0);
        w.int16(params.len() as i16);
        for (param, &typ) in params.iter().zip(&data.param_typs) {
            if param.is_null() {
                w.int32(-1);
                continue;
            }
            let b = encode::encode(&self.session, param, typ)?;
            w.int32(b.len() as i32);
            w.bytes(&b);
        }
        w.int16(0);
        self.send(w)?;

        let mut w = self.write_message(Frontend::Execute);
        w.string("");
        w.int32(0);
        self.send(w)?;

        let w = self.write_message(Frontend::Sync);
        self.send(w)?;

        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::BindComplete => match err {
                    Some(err) => {
                        self.wait_ready()?;
                        return Err(err);
                    }
                    None => break,
                },
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    return match err {
                        Some(err) => Err(err),
                        None => Ok(()),
                    };
                }
                t => return Err(protocol!("unexpected bind response: ({t})").into()),
            }
        }

        // A row-returning query may already have completed before the
        // caller starts draining, which would swallow an execution error
        // until much later. Wait for one more message: an error drains to
        // ReadyForQuery and surfaces here, anything else parks in the
        // deferred slot and recv1 replays it for the row stream.
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::CommandComplete | Backend::DataRow => {
                    self.saved_message = Some((t, r));
                    return Ok(());
                }
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    return match err {
                        Some(err) => Err(err),
                        None => Err(protocol!(
                            "unexpected ReadyForQuery during extended query execution"
                        )
                        .into()),
                    };
                }
                t => {
                    return Err(protocol!("unexpected message during query execution: ({t})").into())
                }
            }
        }
    }

    /// Consume an execution through `ReadyForQuery`, keeping the first row
    /// and the command tag.
    pub(crate) fn exec_drain(&mut self, data: &mut StmtData) -> Result<ExecResult> {
        let mut res = None;
        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.recv1()?;
            match t {
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::CommandComplete => {
                    let (rows_affected, _) = parse_complete(&r.string()?)?;
                    res = Some(ExecResult::new(rows_affected, data.row_data.as_deref()));
                }
                Backend::ReadyForQuery => {
                    self.process_ready_for_query(&mut r)?;
                    if let Some(err) = err {
                        return Err(err);
                    }
                    return res.ok_or_else(|| protocol!("execute produced no result").into());
                }
                Backend::RowDescription => data.parse_row_description(&mut r)?,
                Backend::DataRow => {
                    if !data.cols.is_empty() && data.row_data.is_none() {
                        data.row_data = Some(parse_data_row(&mut r, &data.row_typs)?);
                    }
                }
                t => return Err(protocol!("unknown exec response: ({t})").into()),
            }
        }
    }
}

/// A statement parsed on the server side.
///
/// Dropping the statement closes it on the server; [`close`][Statement::close]
/// does the same with an error surface, and is idempotent.
pub struct Statement<'c> {
    conn: &'c mut Connection,
    data: StmtData,
    closed: bool,
}

impl Statement<'_> {
    /// Column names of the result shape.
    pub fn columns(&self) -> &[String] {
        &self.data.cols
    }

    /// Number of parameters the statement takes.
    pub fn num_params(&self) -> usize {
        self.data.param_typs.len()
    }

    /// Parameter type OIDs learned from `ParameterDescription`.
    pub fn param_types(&self) -> &[Oid] {
        &self.data.param_typs
    }

    /// Bind parameters, execute, and stream the resulting rows.
    pub fn query(&mut self, params: &[Value]) -> Result<Rows<'_>> {
        self.data.row_data = None;
        self.conn.exec_bind(&self.data, params)?;
        Ok(Rows::streaming_borrowed(&mut *self.conn, &self.data))
    }

    /// Bind parameters, execute, and consume the result.
    ///
    /// Without parameters this takes the simple-query path.
    pub fn execute(&mut self, params: &[Value]) -> Result<ExecResult> {
        if params.is_empty() {
            let (res, _) = self.conn.simple_exec(&self.data.query)?;
            return Ok(res);
        }
        self.data.row_data = None;
        self.conn.exec_bind(&self.data, params)?;
        self.conn.exec_drain(&mut self.data)
    }

    /// Close the statement on the server: `Close('S', name)` + `Sync`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        // 'S' is not a Sync here; it addresses the close at a statement
        let mut w = self.conn.write_message(Frontend::Close);
        w.byte(b'S');
        w.string(&self.data.name);
        self.conn.send(w)?;

        let w = self.conn.write_message(Frontend::Sync);
        self.conn.send(w)?;

        let (t, _) = self.conn.recv()?;
        if t != Backend::CloseComplete {
            return Err(protocol!("unexpected close response: ({t})").into());
        }
        self.closed = true;

        let (t, mut r) = self.conn.recv()?;
        if t != Backend::ReadyForQuery {
            return Err(protocol!("expected ready for query, but got: ({t})").into());
        }
        self.conn.process_ready_for_query(&mut r)?;
        Ok(())
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("statement close error: {err:#?}");
        }
    }
}

/// Cursor over an execution in progress.
///
/// The cursor must be driven to completion (or dropped, which drains it)
/// before the connection accepts another request.
pub struct Rows<'c> {
    conn: &'c mut Connection,
    cols: Vec<String>,
    row_typs: Vec<Oid>,
    done: bool,
}

impl<'c> Rows<'c> {
    fn done(conn: &'c mut Connection) -> Self {
        Self { conn, cols: Vec::new(), row_typs: Vec::new(), done: true }
    }

    fn streaming(conn: &'c mut Connection, data: StmtData) -> Self {
        Self { conn, cols: data.cols, row_typs: data.row_typs, done: false }
    }

    fn streaming_borrowed(conn: &'c mut Connection, data: &StmtData) -> Self {
        Self { conn, cols: data.cols.clone(), row_typs: data.row_typs.clone(), done: false }
    }

    /// Column names of the result shape.
    pub fn columns(&self) -> &[String] {
        &self.cols
    }

    /// The next row, or `None` once the stream is exhausted.
    pub fn next(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        let mut err: Option<Error> = None;
        loop {
            let (t, mut r) = self.conn.recv1()?;
            match t {
                Backend::ErrorResponse => err = Some(parse_error(&mut r)?.into()),
                Backend::CommandComplete => {}
                Backend::ReadyForQuery => {
                    self.conn.process_ready_for_query(&mut r)?;
                    self.done = true;
                    return match err {
                        Some(err) => Err(err),
                        None => Ok(None),
                    };
                }
                Backend::DataRow => return Ok(Some(parse_data_row(&mut r, &self.row_typs)?)),
                t => return Err(protocol!("unexpected message after execute: ({t})").into()),
            }
        }
    }

    /// Drain the remainder of the result set.
    pub fn close(&mut self) -> Result<()> {
        while !self.done {
            if let Err(err) = self.next() {
                self.done = true;
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("rows close error: {err:#?}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn command_tags() {
        assert_eq!(parse_complete("INSERT 0 3").unwrap(), (3, "INSERT".to_string()));
        assert_eq!(parse_complete("SELECT 10").unwrap(), (10, "SELECT".to_string()));
        assert_eq!(parse_complete("UPDATE 0").unwrap(), (0, "UPDATE".to_string()));
        assert_eq!(parse_complete("DELETE 42").unwrap(), (42, "DELETE".to_string()));
        assert_eq!(parse_complete("FETCH 1").unwrap(), (1, "FETCH".to_string()));
        assert_eq!(parse_complete("COPY 7").unwrap(), (7, "COPY".to_string()));
    }

    #[test]
    fn command_tags_without_counts() {
        assert_eq!(parse_complete("BEGIN").unwrap(), (0, "BEGIN".to_string()));
        assert_eq!(parse_complete("COMMIT").unwrap(), (0, "COMMIT".to_string()));
        assert_eq!(parse_complete("CREATE TABLE").unwrap(), (0, "CREATE TABLE".to_string()));
    }

    #[test]
    fn command_tags_malformed() {
        assert!(parse_complete("INSERT 3").is_err());
        assert!(parse_complete("SELECT x").is_err());
    }

    #[test]
    fn last_insert_id_from_row() {
        let row = vec![Value::Text("s".into()), Value::Int(42), Value::Int(43)];
        let res = ExecResult::new(1, Some(&row));
        assert_eq!(res.rows_affected(), 1);
        assert_eq!(res.last_insert_id(), Some(42));

        let res = ExecResult::new(3, None);
        assert_eq!(res.last_insert_id(), None);

        let row = vec![Value::Text("only strings".into())];
        assert_eq!(ExecResult::new(1, Some(&row)).last_insert_id(), None);
    }

    #[test]
    fn row_description() {
        let mut body = vec![0u8, 2];
        for (name, typ) in [("id", oid::INT8), ("name", oid::VARCHAR)] {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&[0; 6]);
            body.extend_from_slice(&typ.to_be_bytes());
            body.extend_from_slice(&[0; 8]);
        }

        let mut data = StmtData::new(String::new(), "SELECT id, name FROM t");
        data.parse_row_description(&mut ReadBuf::new(Bytes::from(body))).unwrap();
        assert_eq!(data.cols, ["id", "name"]);
        assert_eq!(data.row_typs, [oid::INT8, oid::VARCHAR]);
    }

    #[test]
    fn data_row() {
        let mut body = vec![0u8, 3];
        body.extend_from_slice(&2i32.to_be_bytes());
        body.extend_from_slice(b"14");
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(b"x");

        let typs = [oid::INT8, oid::VARCHAR, oid::TEXT];
        let row = parse_data_row(&mut ReadBuf::new(Bytes::from(body)), &typs).unwrap();
        assert_eq!(row, vec![Value::Int(14), Value::Null, Value::Text("x".into())]);
    }
}
