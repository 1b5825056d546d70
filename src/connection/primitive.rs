//! The session primitives a `ResilientConnection` can drive through its retry loop.

use async_trait::async_trait;

use crate::interfaces::{DriverResult, Row, Session};

/// One typed call on a `Session`.
#[async_trait]
pub(crate) trait Primitive: Send + Sync {
    type Output: Send;

    /// Operation name used in telemetry and errors.
    const NAME: &'static str;

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<Self::Output>;
}

pub(crate) struct Execute;
pub(crate) struct Update;
pub(crate) struct SelectOne;
pub(crate) struct SelectValue;
pub(crate) struct SelectValues;
pub(crate) struct Query;

#[async_trait]
impl Primitive for Execute {
    type Output = ();
    const NAME: &'static str = "execute";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<()> {
        session.execute(sql).await
    }
}

#[async_trait]
impl Primitive for Update {
    type Output = u64;
    const NAME: &'static str = "update";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<u64> {
        session.update(sql).await
    }
}

#[async_trait]
impl Primitive for SelectOne {
    type Output = Option<Row>;
    const NAME: &'static str = "select_one";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<Option<Row>> {
        session.select_one(sql).await
    }
}

#[async_trait]
impl Primitive for SelectValue {
    type Output = Option<String>;
    const NAME: &'static str = "select_value";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<Option<String>> {
        session.select_value(sql).await
    }
}

#[async_trait]
impl Primitive for SelectValues {
    type Output = Vec<String>;
    const NAME: &'static str = "select_values";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<Vec<String>> {
        session.select_values(sql).await
    }
}

#[async_trait]
impl Primitive for Query {
    type Output = Vec<Row>;
    const NAME: &'static str = "query";

    async fn call(&self, session: &mut dyn Session, sql: &str) -> DriverResult<Vec<Row>> {
        session.query(sql).await
    }
}
