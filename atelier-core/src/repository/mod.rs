mod postgres;

pub use postgres::PostgresRepository;
