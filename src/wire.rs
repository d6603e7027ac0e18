use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::process_socket;
use tokio::net::TcpStream;

use crate::auth::FrontdeskAuthSource;
use crate::engine::Engine;
use crate::model::{Role, Stay};
use crate::observability;
use crate::sql::{self, Command};

/// Login user that gets the staff role. Everyone else is a guest.
const STAFF_USER: &str = "manager";

pub struct FrontdeskHandler {
    engine: Arc<Engine>,
    query_parser: Arc<FrontdeskQueryParser>,
}

impl FrontdeskHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(FrontdeskQueryParser),
        }
    }

    fn client_role<C: ClientInfo>(client: &C) -> Role {
        match client.metadata().get("user").map(String::as_str) {
            Some(STAFF_USER) => Role::Staff,
            _ => Role::Guest,
        }
    }

    async fn dispatch(&self, role: Role, cmd: Command) -> PgWireResult<Vec<Response>> {
        if cmd.required_role() == Role::Staff && role != Role::Staff {
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "42501".into(),
                "permission denied: staff only".into(),
            ))));
        }

        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertRoom { id, number, class, nightly_price } => {
                engine
                    .create_room(id, number, class, nightly_price)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateRoom { id, class, nightly_price } => {
                engine
                    .update_room(id, class, nightly_price)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking {
                id,
                room_id,
                guest_id,
                check_in,
                check_out,
                guests,
                children,
            } => {
                if check_out <= check_in {
                    // Stay::new debug_asserts; reject before constructing
                    return Err(engine_err(crate::engine::EngineError::InvalidRange {
                        check_in,
                        check_out,
                    }));
                }
                engine
                    .create_booking(id, room_id, guest_id, Stay::new(check_in, check_out), guests, children)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectRooms => {
                let rooms = engine.list_rooms().await;
                Ok(vec![room_rows(rooms, room_schema())])
            }
            Command::SelectAvailability { check_in, check_out, cheapest_per_class } => {
                if check_out <= check_in {
                    return Err(engine_err(crate::engine::EngineError::InvalidRange {
                        check_in,
                        check_out,
                    }));
                }
                let stay = Stay::new(check_in, check_out);
                let rooms = if cheapest_per_class {
                    engine.offered_rooms(stay).await.map_err(engine_err)?
                } else {
                    engine.find_available_rooms(stay).await.map_err(engine_err)?
                };
                Ok(vec![room_rows(rooms, availability_schema())])
            }
            Command::SelectBookings { room_id, guest_id, year, month } => {
                let bookings = match (room_id, guest_id) {
                    (Some(rid), _) => engine.get_bookings(rid).await.map_err(engine_err)?,
                    (None, Some(gid)) => {
                        engine.bookings_for_guest(gid).await.map_err(engine_err)?
                    }
                    (None, None) => engine.list_bookings(year, month).await.map_err(engine_err)?,
                };

                let schema = Arc::new(booking_schema());
                let rows: Vec<PgWireResult<_>> = bookings
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.room_id.to_string())?;
                        encoder.encode_field(&b.guest_id.to_string())?;
                        encoder.encode_field(&b.check_in.to_string())?;
                        encoder.encode_field(&b.check_out.to_string())?;
                        encoder.encode_field(&(b.guests as i64))?;
                        encoder.encode_field(&(b.children as i64))?;
                        encoder.encode_field(&b.created_at)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectOccupancy { room_id, day } => {
                let days = engine.occupancy(room_id, day).await.map_err(engine_err)?;

                let schema = Arc::new(occupancy_schema());
                let rows: Vec<PgWireResult<_>> = days
                    .into_iter()
                    .map(|o| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&o.room_id.to_string())?;
                        encoder.encode_field(&o.day.to_string())?;
                        encoder.encode_field(&o.booking_id.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectRevenue { year } => {
                let buckets = engine.aggregate_year(year).await.map_err(engine_err)?;

                let schema = Arc::new(revenue_schema());
                let rows: Vec<PgWireResult<_>> = buckets
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(b.month as i64))?;
                        encoder.encode_field(&b.nights)?;
                        encoder.encode_field(&b.revenue.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
        }
    }
}

fn room_rows(rooms: Vec<crate::model::RoomInfo>, schema: Vec<FieldInfo>) -> Response {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = rooms
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.number)?;
            encoder.encode_field(&r.class.as_str())?;
            encoder.encode_field(&r.nightly_price.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn room_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("number"),
        text_field("class"),
        text_field("nightly_price"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    room_schema()
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("room_id"),
        text_field("guest_id"),
        text_field("check_in"),
        text_field("check_out"),
        int_field("guests"),
        int_field("children"),
        int_field("created_at"),
    ]
}

fn occupancy_schema() -> Vec<FieldInfo> {
    vec![
        text_field("room_id"),
        text_field("day"),
        text_field("booking_id"),
    ]
}

fn revenue_schema() -> Vec<FieldInfo> {
    vec![int_field("month"), int_field("nights"), text_field("revenue")]
}

/// Result schema for a SQL string, used by both Describe paths.
fn schema_for_sql(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("OCCUPANCY") {
        occupancy_schema()
    } else if upper.contains("REVENUE") {
        revenue_schema()
    } else if upper.contains("BOOKINGS") {
        booking_schema()
    } else if upper.contains("ROOMS") {
        room_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for FrontdeskHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let role = Self::client_role(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.dispatch(role, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct FrontdeskQueryParser;

#[async_trait]
impl QueryParser for FrontdeskQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_sql(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for FrontdeskHandler {
    type Statement = String;
    type QueryParser = FrontdeskQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let role = Self::client_role(client);
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.dispatch(role, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_sql(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_sql(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
/// A `$` inside a single-quoted literal is data, not a placeholder.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut in_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_quote = !in_quote;
                i += 1;
            }
            b'$' if !in_quote => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i > start {
                    if let Ok(n) = sql[start..i].parse::<usize>() {
                        if n > max {
                            max = n;
                        }
                    }
                }
            }
            _ => i += 1,
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text
/// format). Placeholders inside single-quoted literals are left alone.
fn substitute_sql<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_quote = false;
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '$' if !in_quote => {
                // digits are single bytes, so byte arithmetic is safe here
                let start = i + 1;
                let mut end = start;
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        chars.next();
                        end += 1;
                    } else {
                        break;
                    }
                }
                let index = sql[start..end].parse::<usize>().ok();
                match index.and_then(|n| n.checked_sub(1)).and_then(|n| params.get(n)) {
                    Some(Some(bytes)) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        out.push('\'');
                        out.push_str(&text.replace('\'', "''"));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push_str(&sql[i..end]),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn substitute_params(portal: &Portal<String>) -> String {
    substitute_sql(&portal.statement.statement, &portal.parameters)
}

// ── Factory ──────────────────────────────────────────────────────

pub struct FrontdeskFactory {
    handler: Arc<FrontdeskHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<FrontdeskAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl FrontdeskFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = FrontdeskAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(FrontdeskHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for FrontdeskFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection to completion.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<pgwire::tokio::TlsAcceptor>,
) -> Result<(), std::io::Error> {
    let factory = Arc::new(FrontdeskFactory::new(engine, password));
    process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
