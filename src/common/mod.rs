mod statement_cache;

pub(crate) use statement_cache::StatementCache;
