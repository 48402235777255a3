pub(super) const ROOT_LONG_ABOUT: &str = "\
Deterministic content hash trees for comparing directories offline

Treehash walks a directory tree with a pool of worker threads, hashes every file, and
reduces the results bottom-up into one hash and one size per directory. The result does
not depend on the order files were created in or on how many threads were used, so two
machines that hash the same content get the same root hash. Compare the small snapshot
files instead of copying the trees over a network.

CORE CONCEPTS:

  Aggregate hash:
    A directory's hash covers the names, hashes and sizes of its files and of its
    subdirectories, in name order. Equal hashes mean equal content all the way down.

  Unreadable entries:
    A file or directory that cannot be read gets an all-zero hash and size 0. The error
    is kept in the listing and the snapshot; the rest of the scan carries on.

  Snapshots:
    A TOML file recording every entry's size and hash, plus the exclusions and algorithm
    used. 'treehash compare' reads them back.

TYPICAL WORKFLOW:

  1. On the first machine:
     $ treehash scan /data/photos --snapshot photos-a.toml -o photos-a.txt

  2. On the second machine:
     $ treehash scan /backup/photos --snapshot photos-b.toml -o photos-b.txt

  3. Copy one snapshot over and compare:
     $ treehash compare photos-a.toml photos-b.toml

     Or compare a snapshot directly against a live directory:
     $ treehash compare photos-a.toml /backup/photos

EXIT CODES:

  0    Success (for compare: no differences)
  1    compare found differences
  255  Any error

For more help on each command:
  treehash scan --help
  treehash compare --help
";

pub(super) const SCAN_LONG_ABOUT: &str = "\
Hash a directory tree and write its listing and snapshot

The listing is written to stdout unless --output is given. With --output, a second file
named OUTPUT.summary receives the same listing restricted to directories, down to
--summary-depth levels.

LISTING FORMAT:

  Two spaces of indentation per level. Each directory line is followed by its files,
  then its subdirectories:

    /data/photos - 1,234 - 3f2a...
      a.txt - 3 - 78af...
      2024 - 1,231 - 9c01...
        b.jpg - 1,231 - 0e5d...

  Entries that could not be read end with ' [error: ...]'.

EXCLUSIONS (--exclude):

  Each pattern is a regular expression tested against the path relative to the scanned
  directory, with '/' separators, anchored at its start. An excluded directory is never
  entered and contributes nothing to any hash.

    --exclude 'node_modules'      skips node_modules at the top level only
    --exclude '.*/node_modules'   skips it at any depth below the top level
    --exclude '.*\\.tmp$'          skips every file ending in .tmp

ALGORITHMS (--algorithm):

  xxh3     XXH3-128. Fast; detects accidental changes, not deliberate ones. (default)
  sha256   SHA-256, for when the content itself is not trusted.

  Trees hashed with different algorithms cannot be compared.

EXAMPLES:

  # Print the listing of the current directory
  $ treehash scan

  # Write listing, summary and snapshot, using 8 threads
  $ treehash scan /data -o data.txt --snapshot data.toml -j 8
";

pub(super) const COMPARE_LONG_ABOUT: &str = "\
Compare two snapshots, or a snapshot and a directory

Each side is either a snapshot written by 'treehash scan --snapshot' or a directory. A
directory compared against a snapshot is scanned with the snapshot's exclusions and
algorithm. When both sides are directories, --exclude and --algorithm apply to both.

Subtrees with equal hashes are skipped without looking inside, so comparing two large,
mostly identical trees is fast.

OUTPUT:

  One line per difference, ordered by path:

    A  path    added
    R  path    removed
    M  path    modified (content, size, or changed between file and directory)

  A removed or added directory is listed once, not entry by entry.

EXIT CODES:

  0    No differences
  1    Differences found
  255  Any error (unreadable snapshot, algorithm mismatch, ...)
";
