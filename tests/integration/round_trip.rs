use anchor_cli::dockerfile::{self, CommandType};

#[test]
fn test_round_trip_preserves_layout() {
    let inputs = [
        "",
        "\n\n",
        "FROM debian",
        "FROM debian\r\nRUN echo hi\r\n",
        "RUN a \\\n\n    # inner comment\n    b \\\n",
        "  # leading indent\n\tLABEL a=b   \n# trailing comment",
        "RUN apt-get install -y curl \\\n  wget\nCMD [\"sh\"]\n\n\n",
    ];

    for input in inputs {
        let nodes = dockerfile::parse(input);
        let mut out = Vec::new();
        nodes.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), input, "input: {input:?}");
    }
}

#[test]
fn test_every_line_lands_in_exactly_one_node() {
    let input = "# a\nFROM x AS y\n\nRUN one \\\n  two\n# tail\n\n";
    let nodes = dockerfile::parse(input);

    let entries: usize = nodes.iter().map(|n| n.entries.len()).sum();
    assert_eq!(entries, input.lines().count());

    let kinds: Vec<_> = nodes.iter().map(|n| n.command_type).collect();
    assert_eq!(kinds, vec![CommandType::From, CommandType::Run, CommandType::Other]);
    assert_eq!(nodes[1].command, "one two");
}
