fn main() {
	let mut emitter = vergen_gitcl::Emitter::default();

	emitter
		.add_instructions(
			&vergen_gitcl::CargoBuilder::default()
				.target_triple(true)
				.build()
				.expect("Failed to configure cargo instructions."),
		)
		.expect("Failed to add cargo instructions.");

	// Source tarballs carry no git metadata.
	let git_added = vergen_gitcl::GitclBuilder::default()
		.sha(true)
		.build()
		.map(|gitcl| emitter.add_instructions(&gitcl).is_ok())
		.unwrap_or(false);

	if !git_added {
		println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
	}

	emitter.emit().expect("Failed to emit build instructions.");
}
