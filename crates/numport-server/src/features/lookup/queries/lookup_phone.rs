use mediator::Request;
use numport_common::{NumportError, PhoneNumber};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupPhoneQuery {
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupPhoneResponse {
    pub phone: String,
    pub ddd: String,
    pub prefix: String,
    /// Operator currently serving the number.
    pub operator: Option<String>,
    /// Operator that owns the numbering range.
    pub original_operator: Option<String>,
    pub ported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_spid: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupPhoneError {
    #[error(transparent)]
    InvalidPhone(#[from] NumportError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<LookupPhoneResponse, LookupPhoneError>> for LookupPhoneQuery {}

impl LookupPhoneQuery {
    pub fn validate(&self) -> Result<PhoneNumber, LookupPhoneError> {
        Ok(PhoneNumber::parse(&self.phone)?)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RangeRecord {
    operator_name: Option<String>,
    state: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct PortingRecord {
    target_spid: Option<String>,
    operator_name: Option<String>,
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: LookupPhoneQuery,
) -> Result<LookupPhoneResponse, LookupPhoneError> {
    let phone = query.validate()?;

    let range = sqlx::query_as::<_, RangeRecord>(
        r#"
        SELECT nome_operadora AS operator_name, estado AS state
        FROM faixa_operadora
        WHERE ddd = $1
          AND prefixo = $2
          AND faixa_inicio <= $3
          AND faixa_fim >= $3
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(phone.ddd())
    .bind(phone.prefix())
    .bind(phone.range_key() as i32)
    .fetch_optional(&pool)
    .await?;

    // Most recently loaded record wins; the export is chronological.
    let porting = sqlx::query_as::<_, PortingRecord>(
        r#"
        SELECT h.target_spid,
               COALESCE(s.nome_fantasia, s.razao_social) AS operator_name
        FROM portability_history h
        LEFT JOIN operadoras_stfc s ON s.spid = h.target_spid
        WHERE h.phone_number = $1
        ORDER BY h.id DESC
        LIMIT 1
        "#,
    )
    .bind(phone.as_i64())
    .fetch_optional(&pool)
    .await?;

    Ok(build_response(&phone, range, porting))
}

fn build_response(
    phone: &PhoneNumber,
    range: Option<RangeRecord>,
    porting: Option<PortingRecord>,
) -> LookupPhoneResponse {
    let (original_operator, state) = match range {
        Some(r) => (r.operator_name, r.state),
        None => (None, None),
    };

    let ported = porting.is_some();
    let (operator, current_spid) = match porting {
        Some(p) => (p.operator_name.or_else(|| p.target_spid.clone()), p.target_spid),
        None => (original_operator.clone(), None),
    };

    LookupPhoneResponse {
        phone: phone.digits().to_string(),
        ddd: phone.ddd().to_string(),
        prefix: phone.prefix().to_string(),
        operator,
        original_operator,
        ported,
        state,
        current_spid,
    }
}
