#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use valyria_cli::Cli;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommands_parse() {
        for args in [
            vec!["valyria"],
            vec!["valyria", "serve"],
            vec!["valyria", "status", "--url", "http://localhost:8000"],
            vec!["valyria", "config", "--json"],
            vec!["valyria", "doctor"],
            vec!["valyria", "version"],
            vec!["valyria", "--config", "/etc/valyria.toml", "-v", "doctor"],
        ] {
            assert!(Cli::try_parse_from(args.iter().copied()).is_ok(), "failed to parse {args:?}");
        }
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["valyria", "launch"]).is_err());
    }
}
