#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::absolute_paths,
    clippy::arithmetic_side_effects,
    clippy::as_conversions,
    clippy::cast_lossless, // u32 -> u64
    clippy::cast_possible_truncation, // u64 -> u32
    clippy::cast_possible_wrap, // u32 -> i32
    clippy::cast_sign_loss, // i32 -> u32
    clippy::option_if_let_else,
    clippy::future_not_send,
    clippy::host_endian_bytes,
    clippy::implicit_return,
    clippy::indexing_slicing,
    clippy::inline_always,
    clippy::integer_division,
    clippy::min_ident_chars,
    clippy::missing_assert_message,
    clippy::missing_trait_methods,
    clippy::module_name_repetitions,
    clippy::multiple_unsafe_ops_per_block,
    clippy::needless_pass_by_value,
    clippy::non_ascii_literal,
    clippy::single_char_lifetime_names,
    clippy::pattern_type_mismatch,
    clippy::pub_use,
    clippy::question_mark_used,
    clippy::ref_patterns,
    clippy::self_named_module_files,
    clippy::shadow_reuse,
    clippy::shadow_unrelated,
    clippy::similar_names,
    clippy::single_call_fn,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::string_add,
    clippy::unseparated_literal_suffix,
    clippy::wildcard_enum_match_arm,
)]

use hscr::{
    config::{DbArgs, DbConfig},
    repo::Store,
};

/// Prints the movie aggregates as JSON.
#[derive(clap::Parser)]
#[command(version)]
struct Args {
    /// Rows in the top-rated list
    #[arg(long, default_value_t = 10)]
    top: i32,
    /// Genres to show, most frequent first
    #[arg(long, default_value_t = 10)]
    genres: i64,
    /// Directors to show, most prolific first
    #[arg(long, default_value_t = 10)]
    directors: i64,
    #[command(flatten)]
    db: DbArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();
    let config = DbConfig::try_from(args.db)?;
    let store = Store::pooled(&config).await?;

    let report = store
        .movie_report(args.top, args.genres, args.directors)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
