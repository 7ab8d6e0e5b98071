use locator::database::DatabaseError;

pub mod station;

pub(crate) fn convert_error(why: sqlx::Error) -> DatabaseError {
    match why {
        sqlx::Error::RowNotFound => DatabaseError::NotFound,
        sqlx::Error::PoolTimedOut => {
            DatabaseError::Timeout(std::time::Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS))
        }
        _ => DatabaseError::Other(Box::new(why)),
    }
}

pub(crate) const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;
